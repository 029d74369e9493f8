use validator::ValidateEmail;

// Statuts autorisés pour les rendez-vous
pub const VALID_APPOINTMENT_STATUSES: [&str; 4] = ["pending", "confirmed", "completed", "cancelled"];
pub const VALID_PAYMENT_STATUSES: [&str; 2] = ["unpaid", "paid"];

// Rôles autorisés en base
pub const VALID_ROLES: [&str; 3] = ["admin", "vet", "owner"];

/// Valide un email: syntaxe RFC via validator + domaine avec un point,
/// sans espaces (le validator accepte "user@localhost", pas nous)
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let domain_has_dot = email
        .rsplit('@')
        .next()
        .map_or(false, |domain| domain.contains('.'));

    email.validate_email() && domain_has_dot
}

/// Valide un numéro rwandais: +250 suivi de 9 chiffres
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix("+250") else {
        return false;
    };
    digits.len() == 9 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Normalise un rôle externe: "farmer" est l'alias historique de "owner".
/// Retourne None si le rôle n'est pas reconnu.
pub fn normalize_role(role: &str) -> Option<String> {
    if role == "farmer" {
        return Some("owner".to_string());
    }
    if VALID_ROLES.contains(&role) {
        return Some(role.to_string());
    }
    None
}

/// Dérive un handle en minuscules depuis le nom complet
/// ("Jean Claude Muhire" -> "jeanclaudemuhire")
pub fn derive_handle(full_name: &str) -> String {
    let handle: String = full_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    if handle.is_empty() {
        "user".to_string()
    } else {
        handle
    }
}
