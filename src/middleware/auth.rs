use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::models::{sessions, users};

/// Nom du cookie qui porte le token de session opaque
pub const SESSION_COOKIE: &str = "vetconnect_session";

/// Structure qui contient les infos de l'utilisateur authentifié
/// Utilisée comme extracteur dans les routes protégées
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub name: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn is_vet(&self) -> bool {
        self.role == "vet"
    }
}

/// 401 uniforme: cookie absent, token inconnu et session expirée sont
/// indistinguables pour l'appelant
fn unauthorized() -> Error {
    let response = HttpResponse::Unauthorized().json(serde_json::json!({
        "error": "Unauthorized"
    }));
    actix_web::error::InternalError::from_response("", response).into()
}

fn internal_error() -> Error {
    let response = HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error"
    }));
    actix_web::error::InternalError::from_response("", response).into()
}

/// Implémentation de FromRequest pour AuthUser
/// Résout le cookie de session contre la table sessions (expiration absolue,
/// pas de sliding expiration). Lecture seule, aucun effet de bord.
impl FromRequest for AuthUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            // 1. Extraire le cookie de session
            let token = match req.cookie(SESSION_COOKIE) {
                Some(cookie) => cookie.value().to_string(),
                None => return Err(unauthorized()),
            };

            // 2. Récupérer la connexion BD depuis l'app data
            let db = match req.app_data::<web::Data<DatabaseConnection>>() {
                Some(db) => db.clone(),
                None => {
                    tracing::error!("DatabaseConnection absente de l'app data");
                    return Err(internal_error());
                }
            };

            // 3. Chercher une session non expirée portant ce token
            let now = chrono::Utc::now().naive_utc();
            let session = match sessions::Entity::find()
                .filter(sessions::Column::Token.eq(token.as_str()))
                .filter(sessions::Column::ExpiresAt.gt(now))
                .one(db.get_ref())
                .await
            {
                Ok(Some(session)) => session,
                Ok(None) => return Err(unauthorized()),
                Err(e) => {
                    tracing::error!(error = %e, "échec de la résolution de session");
                    return Err(internal_error());
                }
            };

            // 4. Charger l'utilisateur propriétaire de la session
            match users::Entity::find_by_id(session.user_id)
                .one(db.get_ref())
                .await
            {
                Ok(Some(user)) => Ok(AuthUser {
                    user_id: user.id,
                    name: user.name,
                    role: user.role,
                }),
                // Session orpheline: l'utilisateur n'existe plus
                Ok(None) => Err(unauthorized()),
                Err(e) => {
                    tracing::error!(error = %e, "échec du chargement de l'utilisateur");
                    Err(internal_error())
                }
            }
        })
    }
}
