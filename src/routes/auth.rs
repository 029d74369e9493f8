use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Duration;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::auth::SESSION_COOKIE;
use crate::middleware::AuthUser;
use crate::models::{email_verification_tokens, password_reset_tokens, sessions, users};
use crate::services::email_service::EmailService;
use crate::utils::password;
use crate::utils::validation::{derive_handle, is_valid_email, is_valid_phone, normalize_role};

// DTO pour l'inscription
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub name: Option<String>, // handle explicite; sinon dérivé du nom complet
}

// DTO pour la connexion
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

// DTO pour changer le mot de passe
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub token: Option<String>,
}

/// Durée de vie d'une session, absolue depuis sa création
fn session_duration_days() -> i64 {
    std::env::var("SESSION_DURATION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7)
}

fn user_projection(user: &users::Model) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "name": user.name,
        "full_name": user.full_name,
        "email": user.email,
        "role": user.role,
        "created_at": user.created_at
    })
}

/// POST /api/auth/register - Créer un compte (PUBLIC)
#[post("/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
    email_service: web::Data<EmailService>,
) -> HttpResponse {
    let body = body.into_inner();

    // 1. Champs requis
    let (full_name, email, user_password, role) = match (
        body.full_name.filter(|v| !v.trim().is_empty()),
        body.email.filter(|v| !v.trim().is_empty()),
        body.password.filter(|v| !v.is_empty()),
        body.role.filter(|v| !v.trim().is_empty()),
    ) {
        (Some(full_name), Some(email), Some(password), Some(role)) => {
            (full_name, email, password, role)
        }
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "full_name, email, password and role are required"
            }));
        }
    };

    // 2. Formats
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

    // 3. Rôle: "farmer" est l'alias externe de "owner"
    let Some(role) = normalize_role(&role) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Invalid role. Must be one of: admin, vet, owner"
        }));
    };

    // 4. Unicité email (insensible à la casse: tout est stocké en minuscules)
    let email_lower = email.to_lowercase();
    match users::Entity::find()
        .filter(users::Column::Email.eq(email_lower.as_str()))
        .one(db.get_ref())
        .await
    {
        Ok(Some(_)) => {
            return HttpResponse::Conflict().json(serde_json::json!({
                "error": "Email already exists"
            }));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "échec de la vérification d'unicité email");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to register"
            }));
        }
    }

    // 5. Handle: fourni explicitement (conflit = 409), sinon dérivé du nom
    // complet avec suffixe aléatoire en cas de collision
    let handle = match body.name.filter(|v| !v.trim().is_empty()) {
        Some(name) => {
            let name = name.to_lowercase();
            match users::Entity::find()
                .filter(users::Column::Name.eq(name.as_str()))
                .one(db.get_ref())
                .await
            {
                Ok(Some(_)) => {
                    return HttpResponse::Conflict().json(serde_json::json!({
                        "error": "Username already taken"
                    }));
                }
                Ok(None) => name,
                Err(e) => {
                    tracing::error!(error = %e, "échec de la vérification du handle");
                    return HttpResponse::InternalServerError().json(serde_json::json!({
                        "error": "Failed to register"
                    }));
                }
            }
        }
        None => {
            let base = derive_handle(&full_name);
            let mut candidate = base.clone();
            let mut attempts = 0;
            loop {
                match users::Entity::find()
                    .filter(users::Column::Name.eq(candidate.as_str()))
                    .one(db.get_ref())
                    .await
                {
                    Ok(None) => break candidate,
                    Ok(Some(_)) => {
                        attempts += 1;
                        if attempts > 4 {
                            return HttpResponse::Conflict().json(serde_json::json!({
                                "error": "Could not derive a unique username"
                            }));
                        }
                        let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
                        candidate = format!("{}{}", base, suffix);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "échec de la vérification du handle");
                        return HttpResponse::InternalServerError().json(serde_json::json!({
                            "error": "Failed to register"
                        }));
                    }
                }
            }
        }
    };

    // 6. Hash du mot de passe - jamais de stockage en clair
    let password_hash = match password::hash_password(&user_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "échec du hash du mot de passe");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to register"
            }));
        }
    };

    // 7. Créer l'utilisateur
    let now = chrono::Utc::now().naive_utc();
    let new_user = users::ActiveModel {
        name: Set(handle),
        full_name: Set(full_name),
        email: Set(email_lower),
        phone: Set(body.phone),
        address: Set(body.address),
        role: Set(role),
        password: Set(password_hash),
        email_verified: Set(false),
        created_at: Set(Some(now)),
        last_login: Set(None),
        ..Default::default()
    };

    let user = match new_user.insert(db.get_ref()).await {
        Ok(user) => user,
        // Filet structuré si deux inscriptions passent le pre-check en même temps
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                return HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Email already exists"
                }));
            }
            _ => {
                tracing::error!(error = %e, "échec de la création d'un utilisateur");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to register"
                }));
            }
        },
    };

    // 8. Token de vérification + email, en best-effort: un échec est loggé
    // mais n'annule pas l'inscription
    let token = Uuid::new_v4().to_string();
    let new_token = email_verification_tokens::ActiveModel {
        user_id: Set(user.id),
        token: Set(token.clone()),
        expires_at: Set(now + Duration::hours(24)),
        used: Set(false),
        created_at: Set(Some(now)),
        ..Default::default()
    };
    match new_token.insert(db.get_ref()).await {
        Ok(_) => {
            if let Err(e) = email_service
                .send_verification_email(&user.email, &user.full_name, &token)
                .await
            {
                tracing::warn!(error = %e, "email de vérification non envoyé");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "token de vérification non créé");
        }
    }

    HttpResponse::Created().json(serde_json::json!({
        "message": "Registration successful. Please check your email to verify your account.",
        "user": user_projection(&user)
    }))
}

/// POST /api/auth/login - Se connecter: crée une session et pose le cookie (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (email, login_password) = match (
        body.email.filter(|v| !v.trim().is_empty()),
        body.password.filter(|v| !v.is_empty()),
    ) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "email and password are required"
            }));
        }
    };

    // 1. Trouver l'utilisateur - email inconnu et mauvais mot de passe
    // donnent la même réponse
    let user = match users::Entity::find()
        .filter(users::Column::Email.eq(email.to_lowercase()))
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Invalid email or password"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la recherche de l'utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to log in"
            }));
        }
    };

    // 2. Vérifier le mot de passe
    match password::verify_password(&login_password, &user.password) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Invalid email or password"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la vérification du mot de passe");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to log in"
            }));
        }
    }

    // 3. last_login, en best-effort
    let now = chrono::Utc::now().naive_utc();
    let mut active: users::ActiveModel = user.clone().into();
    active.last_login = Set(Some(now));
    if let Err(e) = active.update(db.get_ref()).await {
        tracing::warn!(error = %e, "last_login non mis à jour");
    }

    // 4. Créer la session - token opaque, expiration absolue
    let days = session_duration_days();
    let token = Uuid::new_v4().to_string();
    let new_session = sessions::ActiveModel {
        user_id: Set(user.id),
        token: Set(token.clone()),
        expires_at: Set(now + Duration::days(days)),
        created_at: Set(Some(now)),
        ..Default::default()
    };
    if let Err(e) = new_session.insert(db.get_ref()).await {
        tracing::error!(error = %e, "échec de la création de session");
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Failed to log in"
        }));
    }

    // 5. Poser le cookie HttpOnly
    let cookie = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::days(days))
        .finish();

    HttpResponse::Ok().cookie(cookie).json(serde_json::json!({
        "message": "Login successful",
        "user": user_projection(&user)
    }))
}

/// POST /api/auth/logout - Supprime la session et expire le cookie
#[post("/logout")]
pub async fn logout(req: HttpRequest, db: web::Data<DatabaseConnection>) -> HttpResponse {
    // Cookie absent toléré: le logout reste un succès
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if let Err(e) = sessions::Entity::delete_many()
            .filter(sessions::Column::Token.eq(cookie.value()))
            .exec(db.get_ref())
            .await
        {
            tracing::warn!(error = %e, "session non supprimée au logout");
        }
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.make_removal();

    HttpResponse::Ok().cookie(removal).json(serde_json::json!({
        "message": "Logged out successfully"
    }))
}

/// GET /api/auth/me - Identité de l'appelant (PROTÉGÉE)
#[get("/me")]
pub async fn me(auth_user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(auth_user)
}

/// POST /api/auth/change-password - Changer son mot de passe (PROTÉGÉE)
#[post("/change-password")]
pub async fn change_password(
    auth_user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (current_password, new_password) = match (
        body.current_password.filter(|v| !v.is_empty()),
        body.new_password.filter(|v| !v.is_empty()),
    ) {
        (Some(current), Some(new)) => (current, new),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "current_password and new_password are required"
            }));
        }
    };

    // 1. Récupérer l'utilisateur
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
            tracing::error!(error = %e, "échec du chargement de l'utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to change password"
            }));
        }
    };

    // 2. Vérifier l'ancien mot de passe
    match password::verify_password(&current_password, &user.password) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Current password is incorrect"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la vérification du mot de passe");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to change password"
            }));
        }
    }

    // 3. Hasher et stocker le nouveau
    let new_password_hash = match password::hash_password(&new_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "échec du hash du mot de passe");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to change password"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();
    active.password = Set(new_password_hash);

    match active.update(db.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Password changed successfully"
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la mise à jour du mot de passe");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to change password"
            }))
        }
    }
}

/// POST /api/auth/forgot-password - Demander un lien de reset (PUBLIC).
/// La réponse est identique que l'email existe ou non.
#[post("/forgot-password")]
pub async fn forgot_password(
    body: web::Json<ForgotPasswordRequest>,
    db: web::Data<DatabaseConnection>,
    email_service: web::Data<EmailService>,
) -> HttpResponse {
    let Some(email) = body.into_inner().email.filter(|v| !v.trim().is_empty()) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "email is required"
        }));
    };

    let neutral = serde_json::json!({
        "message": "If this email exists, a reset link has been sent"
    });

    let user = match users::Entity::find()
        .filter(users::Column::Email.eq(email.to_lowercase()))
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return HttpResponse::Ok().json(neutral),
        Err(e) => {
            tracing::error!(error = %e, "échec de la recherche de l'utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to process request"
            }));
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let token = Uuid::new_v4().to_string();
    let new_token = password_reset_tokens::ActiveModel {
        user_id: Set(user.id),
        token: Set(token.clone()),
        expires_at: Set(now + Duration::hours(1)),
        used: Set(false),
        created_at: Set(Some(now)),
        ..Default::default()
    };

    match new_token.insert(db.get_ref()).await {
        Ok(_) => {
            if let Err(e) = email_service
                .send_reset_email(&user.email, &user.full_name, &token)
                .await
            {
                tracing::warn!(error = %e, "email de reset non envoyé");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "token de reset non créé");
        }
    }

    HttpResponse::Ok().json(neutral)
}

/// POST /api/auth/reset-password - Consommer un token de reset (PUBLIC)
#[post("/reset-password")]
pub async fn reset_password(
    body: web::Json<ResetPasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (token, new_password) = match (
        body.token.filter(|v| !v.trim().is_empty()),
        body.password.filter(|v| !v.is_empty()),
    ) {
        (Some(token), Some(password)) => (token, password),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "token and password are required"
            }));
        }
    };

    // 1. Token existant, non utilisé, non expiré
    let now = chrono::Utc::now().naive_utc();
    let reset_token = match password_reset_tokens::Entity::find()
        .filter(password_reset_tokens::Column::Token.eq(token.as_str()))
        .filter(password_reset_tokens::Column::Used.eq(false))
        .filter(password_reset_tokens::Column::ExpiresAt.gt(now))
        .one(db.get_ref())
        .await
    {
        Ok(Some(reset_token)) => reset_token,
        Ok(None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired token"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la recherche du token de reset");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to reset password"
            }));
        }
    };

    // 2. Re-hasher le mot de passe de l'utilisateur
    let password_hash = match password::hash_password(&new_password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "échec du hash du mot de passe");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to reset password"
            }));
        }
    };

    let user = match users::Entity::find_by_id(reset_token.user_id)
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired token"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement de l'utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to reset password"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();
    active.password = Set(password_hash);
    if let Err(e) = active.update(db.get_ref()).await {
        tracing::error!(error = %e, "échec de la mise à jour du mot de passe");
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Failed to reset password"
        }));
    }

    // 3. Invalider le token: usage unique
    let mut used_token: password_reset_tokens::ActiveModel = reset_token.into();
    used_token.used = Set(true);
    if let Err(e) = used_token.update(db.get_ref()).await {
        tracing::error!(error = %e, "token de reset non invalidé");
    }

    HttpResponse::Ok().json(serde_json::json!({
        "message": "Password reset successfully"
    }))
}

/// POST /api/auth/verify-email - Consommer un token de vérification (PUBLIC)
#[post("/verify-email")]
pub async fn verify_email(
    body: web::Json<VerifyEmailRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let Some(token) = body.into_inner().token.filter(|v| !v.trim().is_empty()) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "token is required"
        }));
    };

    let now = chrono::Utc::now().naive_utc();
    let verification = match email_verification_tokens::Entity::find()
        .filter(email_verification_tokens::Column::Token.eq(token.as_str()))
        .filter(email_verification_tokens::Column::Used.eq(false))
        .filter(email_verification_tokens::Column::ExpiresAt.gt(now))
        .one(db.get_ref())
        .await
    {
        Ok(Some(verification)) => verification,
        Ok(None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired token"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la recherche du token de vérification");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to verify email"
            }));
        }
    };

    let user = match users::Entity::find_by_id(verification.user_id)
        .one(db.get_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid or expired token"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement de l'utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to verify email"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();
    active.email_verified = Set(true);
    if let Err(e) = active.update(db.get_ref()).await {
        tracing::error!(error = %e, "échec de la mise à jour de l'utilisateur");
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Failed to verify email"
        }));
    }

    let mut used_token: email_verification_tokens::ActiveModel = verification.into();
    used_token.used = Set(true);
    if let Err(e) = used_token.update(db.get_ref()).await {
        tracing::error!(error = %e, "token de vérification non invalidé");
    }

    HttpResponse::Ok().json(serde_json::json!({
        "message": "Email verified successfully"
    }))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(logout)
            .service(me)
            .service(change_password)
            .service(forgot_password)
            .service(reset_password)
            .service(verify_email),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::test_helpers::mock_user;

    macro_rules! build_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db))
                    .app_data(web::Data::new(EmailService::disabled()))
                    .configure(auth_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_register_missing_role_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "Claudine Uwase",
                "email": "claudine@vetconnect.rw",
                "password": "secret123"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_register_invalid_email_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "Claudine Uwase",
                "email": "claudine@localhost",
                "password": "secret123",
                "role": "farmer"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid email format");
    }

    #[actix_web::test]
    async fn test_register_invalid_phone_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "Claudine Uwase",
                "email": "claudine@vetconnect.rw",
                "password": "secret123",
                "role": "owner",
                "phone": "0788123456"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_register_unknown_role_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "Claudine Uwase",
                "email": "claudine@vetconnect.rw",
                "password": "secret123",
                "role": "superuser"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_register_duplicate_email_is_409() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // le pre-check d'unicité trouve un compte existant
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "User 1",
                "email": "USER1@vetconnect.rw",
                "password": "secret123",
                "role": "owner"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_register_farmer_becomes_owner() {
        let created = users::Model {
            role: "owner".to_string(),
            email_verified: false,
            ..mock_user(5, "owner")
        };
        let verification = email_verification_tokens::Model {
            id: 1,
            user_id: 5,
            token: "t".to_string(),
            expires_at: chrono::Utc::now().naive_utc() + Duration::hours(24),
            used: false,
            created_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // unicité email: libre
            .append_query_results([Vec::<users::Model>::new()])
            // unicité handle dérivé: libre
            .append_query_results([Vec::<users::Model>::new()])
            // INSERT user
            .append_query_results([vec![created]])
            // INSERT token de vérification
            .append_query_results([vec![verification]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({
                "full_name": "User 5",
                "email": "user5@vetconnect.rw",
                "password": "secret123",
                "role": "farmer"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["user"]["role"], "owner");
        assert!(body["user"].get("password").is_none());
    }

    #[actix_web::test]
    async fn test_login_wrong_password_is_401() {
        let hash = password::hash_password("le-bon-mot-de-passe").unwrap();
        let user = users::Model {
            password: hash,
            ..mock_user(1, "owner")
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({
                "email": "user1@vetconnect.rw",
                "password": "mauvais"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[actix_web::test]
    async fn test_login_unknown_email_same_401() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({
                "email": "inconnu@vetconnect.rw",
                "password": "peu-importe"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid email or password");
    }

    #[actix_web::test]
    async fn test_login_sets_session_cookie() {
        let hash = password::hash_password("secret123").unwrap();
        let user = users::Model {
            password: hash,
            ..mock_user(1, "owner")
        };
        let session = sessions::Model {
            id: 1,
            user_id: 1,
            token: "t".to_string(),
            expires_at: chrono::Utc::now().naive_utc() + Duration::days(7),
            created_at: None,
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user.clone()]])
            // UPDATE last_login
            .append_query_results([vec![user]])
            // INSERT session
            .append_query_results([vec![session]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({
                "email": "user1@vetconnect.rw",
                "password": "secret123"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let set_cookie = resp
            .headers()
            .get(actix_web::http::header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.contains(SESSION_COOKIE));
        assert!(set_cookie.contains("HttpOnly"));
    }

    #[actix_web::test]
    async fn test_reset_password_expired_token_is_400() {
        // Le filtre expires_at > now écarte le token expiré
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<password_reset_tokens::Model>::new()])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/reset-password")
            .set_json(serde_json::json!({
                "token": "token-fatigué",
                "password": "nouveau123"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[actix_web::test]
    async fn test_verify_email_marks_user_verified() {
        let verification = email_verification_tokens::Model {
            id: 1,
            user_id: 5,
            token: "tok".to_string(),
            expires_at: chrono::Utc::now().naive_utc() + Duration::hours(2),
            used: false,
            created_at: None,
        };
        let verified_user = users::Model {
            email_verified: true,
            ..mock_user(5, "owner")
        };
        let used = email_verification_tokens::Model {
            used: true,
            ..verification.clone()
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![verification]])
            .append_query_results([vec![mock_user(5, "owner")]])
            // UPDATE user (email_verified = true)
            .append_query_results([vec![verified_user]])
            // UPDATE token (used = true)
            .append_query_results([vec![used]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/auth/verify-email")
            .set_json(serde_json::json!({ "token": "tok" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
