// Fabriques partagées par les tests de routes: une session valide et son
// utilisateur, à préfixer dans le MockDatabase avant les résultats propres
// au handler (l'extracteur AuthUser consomme deux requêtes par appel).

use crate::models::{sessions, users};

pub const TEST_TOKEN: &str = "11111111-2222-3333-4444-555555555555";

pub fn mock_user(id: i32, role: &str) -> users::Model {
    users::Model {
        id,
        name: format!("user{}", id),
        full_name: format!("User {}", id),
        email: format!("user{}@vetconnect.rw", id),
        phone: Some("+250788123456".to_string()),
        address: Some("Kigali, Gasabo".to_string()),
        role: role.to_string(),
        password: "pbkdf2:sha256:260000$c2FsdA$aGFzaA".to_string(),
        email_verified: true,
        created_at: Some(chrono::Utc::now().naive_utc()),
        last_login: None,
    }
}

pub fn mock_session(user_id: i32) -> sessions::Model {
    sessions::Model {
        id: 1,
        user_id,
        token: TEST_TOKEN.to_string(),
        expires_at: chrono::Utc::now().naive_utc() + chrono::Duration::days(7),
        created_at: Some(chrono::Utc::now().naive_utc()),
    }
}
