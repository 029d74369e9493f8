// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table PostgreSQL avec SeaORM.
//
// Liste des modules:
//   - health : Health check API
//   - users : Utilisateurs (admin, vétérinaires, propriétaires/farmers)
//   - sessions : Sessions actives (cookie vetconnect_session)
//   - animals : Animaux appartenant aux propriétaires
//   - appointments : Rendez-vous propriétaire/vétérinaire/animal
//   - medical_records : Dossiers médicaux rédigés par les vétérinaires
//   - messages : Messagerie directe entre utilisateurs
//   - notifications : Notifications par utilisateur (marquage lu, bulk)
//   - password_reset_tokens : Tokens de reset password (expire 1h)
//   - email_verification_tokens : Tokens de vérification email (expire 24h)
//
// Points d'attention:
//   - Tous les modèles utilisent SeaORM (pas de SQL brut)
//   - Les relations entre tables sont définies dans chaque modèle
//   - Les colonnes "type" (animals, notifications) sont renommées côté Rust
//
// ============================================================================

pub mod health;
pub mod users;
pub mod sessions;
pub mod animals;
pub mod appointments;
pub mod medical_records;
pub mod messages;
pub mod notifications;
pub mod password_reset_tokens;
pub mod email_verification_tokens;
