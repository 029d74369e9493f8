use actix_web::{get, web, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::users;
use crate::utils::validation::{is_valid_email, is_valid_phone};

// DTO du PUT: name, full_name et email sont requis
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// DTO du PATCH: allow-list {name, full_name, email, phone, address},
// toute autre clé est silencieusement ignorée
#[derive(Deserialize)]
pub struct PatchProfileRequest {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Unicité email/handle en excluant la propre ligne de l'appelant: une
/// resoumission de sa propre valeur reste un no-op, voler celle d'un autre non
async fn email_taken_by_other(
    db: &DatabaseConnection,
    user_id: i32,
    email_lower: &str,
) -> Result<bool, sea_orm::DbErr> {
    Ok(users::Entity::find()
        .filter(users::Column::Email.eq(email_lower))
        .filter(users::Column::Id.ne(user_id))
        .one(db)
        .await?
        .is_some())
}

async fn name_taken_by_other(
    db: &DatabaseConnection,
    user_id: i32,
    name_lower: &str,
) -> Result<bool, sea_orm::DbErr> {
    Ok(users::Entity::find()
        .filter(users::Column::Name.eq(name_lower))
        .filter(users::Column::Id.ne(user_id))
        .one(db)
        .await?
        .is_some())
}

/// GET /api/profile - Le profil de l'utilisateur connecté
#[get("")]
pub async fn get_profile(auth_user: AuthUser, db: web::Data<DatabaseConnection>) -> HttpResponse {
    match users::Entity::find_by_id(auth_user.user_id)
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => HttpResponse::Ok().json(serde_json::json!({
            "user": user
        })),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "User not found"
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement du profil");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch profile"
            }))
        }
    }
}

/// PUT /api/profile - Mise à jour complète des champs modifiables
pub async fn update_profile(
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    // Champs requis
    let (name, full_name, email) = match (
        body.name.filter(|v| !v.trim().is_empty()),
        body.full_name.filter(|v| !v.trim().is_empty()),
        body.email.filter(|v| !v.trim().is_empty()),
    ) {
        (Some(name), Some(full_name), Some(email)) => (name, full_name, email),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "name, full_name and email are required"
            }));
        }
    };

    if !is_valid_email(&email) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid email format"
        }));
    }
    if let Some(ref phone) = body.phone {
        if !is_valid_phone(phone) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid phone number. Expected format: +250XXXXXXXXX"
            }));
        }
    }

    let name_lower = name.to_lowercase();
    let email_lower = email.to_lowercase();

    match email_taken_by_other(db.get_ref(), auth_user.user_id, &email_lower).await {
        Ok(true) => {
            return HttpResponse::Conflict().json(serde_json::json!({
                "error": "Email already in use"
            }));
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = %e, "échec de la vérification d'unicité email");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update profile"
            }));
        }
    }
    match name_taken_by_other(db.get_ref(), auth_user.user_id, &name_lower).await {
        Ok(true) => {
            return HttpResponse::Conflict().json(serde_json::json!({
                "error": "Username already taken"
            }));
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = %e, "échec de la vérification d'unicité du handle");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update profile"
            }));
        }
    }

    let user = match users::Entity::find_by_id(auth_user.user_id)
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "User not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement du profil");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update profile"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();
    active.name = Set(name_lower);
    active.full_name = Set(full_name);
    active.email = Set(email_lower);
    active.phone = Set(body.phone);
    active.address = Set(body.address);

    match active.update(db.get_ref()).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Profile updated successfully",
            "user": user
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Email already in use"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la mise à jour du profil");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update profile"
                }))
            }
        },
    }
}

/// PATCH /api/profile - Mise à jour partielle sur l'allow-list
pub async fn patch_profile(
    auth_user: AuthUser,
    body: web::Json<PatchProfileRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    if body.name.is_none()
        && body.full_name.is_none()
        && body.email.is_none()
        && body.phone.is_none()
        && body.address.is_none()
    {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No fields to update"
        }));
    }

    // Mêmes contrôles que le PUT, mais seulement pour les champs fournis
    if let Some(ref email) = body.email {
        if !is_valid_email(email) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid email format"
            }));
        }
        match email_taken_by_other(db.get_ref(), auth_user.user_id, &email.to_lowercase()).await {
            Ok(true) => {
                return HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Email already in use"
                }));
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "échec de la vérification d'unicité email");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update profile"
                }));
            }
        }
    }
    if let Some(ref phone) = body.phone {
        if !is_valid_phone(phone) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid phone number. Expected format: +250XXXXXXXXX"
            }));
        }
    }
    if let Some(ref name) = body.name {
        match name_taken_by_other(db.get_ref(), auth_user.user_id, &name.to_lowercase()).await {
            Ok(true) => {
                return HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Username already taken"
                }));
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "échec de la vérification d'unicité du handle");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update profile"
                }));
            }
        }
    }

    let user = match users::Entity::find_by_id(auth_user.user_id)
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "User not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement du profil");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update profile"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();

    if let Some(name) = body.name {
        active.name = Set(name.to_lowercase());
    }
    if let Some(full_name) = body.full_name {
        active.full_name = Set(full_name);
    }
    if let Some(email) = body.email {
        active.email = Set(email.to_lowercase());
    }
    if let Some(phone) = body.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(address) = body.address {
        active.address = Set(Some(address));
    }

    match active.update(db.get_ref()).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Profile updated successfully",
            "user": user
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la mise à jour du profil");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update profile"
            }))
        }
    }
}

pub fn profile_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/profile")
            .service(get_profile)
            .route("", web::put().to(update_profile))
            .route("", web::patch().to(patch_profile)),
    );
}
