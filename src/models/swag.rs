use serde::{Deserialize, Serialize};

use super::input::{Input, Inputs};

/// Submission sent to the swag webhook.
///
/// The props are posted verbatim as a JSON object and echoed back as the resource's
/// outputs. `email` doubles as the resource id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwagProps {
    pub name: String,
    pub email: String,
    pub address: String,
    pub size: String,
}

impl SwagProps {
    pub fn to_inputs(&self) -> Inputs {
        Inputs::from([
            ("name".to_string(), Input::literal(self.name.clone())),
            ("email".to_string(), Input::literal(self.email.clone())),
            ("address".to_string(), Input::literal(self.address.clone())),
            ("size".to_string(), Input::literal(self.size.clone())),
        ])
    }
}
