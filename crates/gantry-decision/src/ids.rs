//! Task id generation
//!
//! The platform accepts caller-chosen ids; we use the compact 22-character
//! URL-safe base64 form of a random UUID, matching what it hands out itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

/// Generate a fresh task id
pub fn new_task_id() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = new_task_id();
        assert_eq!(id.len(), 22);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(new_task_id(), new_task_id());
    }
}
