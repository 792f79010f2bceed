//! Records read by the profile area.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "_id")]
    pub id: Option<Value>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    /// Numeric or string id depending on the backend.
    #[serde(alias = "_id")]
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Pet {
    pub fn id_display(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pets_with_mixed_ids() {
        let json = r#"[
            {"_id":"66a1","name":"Luna","breed":"Mestizo","age":2,"image":"luna.jpg"},
            {"id":7,"name":"Toby"}
        ]"#;
        let pets: Vec<Pet> = serde_json::from_str(json).unwrap();
        assert_eq!(pets[0].id_display(), "66a1");
        assert_eq!(pets[0].breed.as_deref(), Some("Mestizo"));
        assert_eq!(pets[1].id_display(), "7");
        assert!(pets[1].image.is_none());
    }

    #[test]
    fn test_parse_profile() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"username":"ana","email":"ana@example.com"}"#).unwrap();
        assert_eq!(profile.username, "ana");
        assert!(profile.role.is_none());
    }
}
