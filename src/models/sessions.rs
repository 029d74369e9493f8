// ============================================================================
// MODÈLE : SESSIONS
// ============================================================================
//
// Description:
//   Modèle de la table sessions. Une ligne = une session active (ou expirée,
//   en attente de nettoyage) pour un utilisateur.
//
// Colonnes de la table sessions:
//   - id (INTEGER, PRIMARY KEY, SERIAL)
//   - user_id (INTEGER, NOT NULL, FK vers users)
//   - token (VARCHAR, UNIQUE, NOT NULL) - UUID v4, credential opaque
//   - expires_at (TIMESTAMP, NOT NULL) - created_at + SESSION_DURATION_DAYS
//   - created_at (TIMESTAMP, DEFAULT CURRENT_TIMESTAMP)
//
// Workflow:
//   1. POST /api/auth/login vérifie le mot de passe
//   2. Backend génère un token UUID v4 et l'insère dans cette table
//   3. Le token est posé dans le cookie HttpOnly "vetconnect_session"
//   4. Chaque route protégée résout le cookie via middleware::AuthUser
//   5. POST /api/auth/logout supprime la ligne et expire le cookie
//
// Points d'attention:
//   - Expiration absolue: pas de sliding expiration, expires_at ne bouge pas
//   - Une session expirée ne doit JAMAIS autoriser une action
//   - ON DELETE CASCADE: si user supprimé, sessions supprimées aussi
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub token: String,

    pub expires_at: DateTime,

    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
