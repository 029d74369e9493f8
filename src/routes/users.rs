use actix_web::{get, web, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::{sessions, users};
use crate::utils::password;
use crate::utils::validation::{is_valid_email, is_valid_phone, normalize_role};

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
}

// DTO admin: mise à jour partielle + changement de mot de passe optionnel
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub id: Option<i32>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteUserQuery {
    pub id: Option<i32>,
}

/// GET /api/users?role= - Lister les utilisateurs (admin uniquement)
#[get("")]
pub async fn get_users(
    auth_user: AuthUser,
    query: web::Query<ListUsersQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if !auth_user.is_admin() {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Forbidden"
        }));
    }

    let mut select = users::Entity::find();

    if let Some(ref role) = query.role {
        // "farmer" est accepté comme alias de "owner" aussi dans le filtre
        let role = normalize_role(role).unwrap_or_else(|| role.clone());
        select = select.filter(users::Column::Role.eq(role));
    }

    match select
        .order_by_desc(users::Column::CreatedAt)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            // Le hash ne sort jamais: champ password en skip_serializing
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "users": rows,
                "total": total
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des utilisateurs");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch users"
            }))
        }
    }
}

/// PUT /api/users - Mise à jour d'un utilisateur par un admin
pub async fn update_user(
    auth_user: AuthUser,
    body: web::Json<UpdateUserRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if !auth_user.is_admin() {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Forbidden"
        }));
    }

    let body = body.into_inner();

    let Some(id) = body.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "User id is required"
        }));
    };

    // Validations de format avant de toucher à la base
    if let Some(ref email) = body.email {
        if !is_valid_email(email) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid email format"
            }));
        }
    }
    if let Some(ref phone) = body.phone {
        if !is_valid_phone(phone) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid phone number. Expected format: +250XXXXXXXXX"
            }));
        }
    }
    let role = match body.role {
        Some(ref role) => match normalize_role(role) {
            Some(role) => Some(role),
            None => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid role. Must be one of: admin, vet, owner"
                }));
            }
        },
        None => None,
    };

    // Unicité email, en excluant la ligne de l'utilisateur cible lui-même
    if let Some(ref email) = body.email {
        let email_lower = email.to_lowercase();
        match users::Entity::find()
            .filter(users::Column::Email.eq(email_lower.as_str()))
            .filter(users::Column::Id.ne(id))
            .one(db.get_ref())
            .await
        {
            Ok(Some(_)) => {
                return HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Email already in use"
                }));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "échec de la vérification d'unicité email");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update user"
                }));
            }
        }
    }

    let user = match users::Entity::find_by_id(id).one(db.get_ref()).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "User not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement d'un utilisateur");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update user"
            }));
        }
    };

    let mut active: users::ActiveModel = user.into();
    let mut updated_fields = 0;

    if let Some(full_name) = body.full_name {
        active.full_name = Set(full_name);
        updated_fields += 1;
    }
    if let Some(email) = body.email {
        active.email = Set(email.to_lowercase());
        updated_fields += 1;
    }
    if let Some(phone) = body.phone {
        active.phone = Set(Some(phone));
        updated_fields += 1;
    }
    if let Some(address) = body.address {
        active.address = Set(Some(address));
        updated_fields += 1;
    }
    if let Some(role) = role {
        active.role = Set(role);
        updated_fields += 1;
    }
    // Mot de passe: fourni et non vide = re-hashé; vide ou absent = intact
    if let Some(new_password) = body.password.filter(|p| !p.trim().is_empty()) {
        let password_hash = match password::hash_password(&new_password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = %e, "échec du hash du mot de passe");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update user"
                }));
            }
        };
        active.password = Set(password_hash);
        updated_fields += 1;
    }

    if updated_fields == 0 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No fields to update"
        }));
    }

    match active.update(db.get_ref()).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "message": "User updated successfully",
            "user": user
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "Email already in use"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la mise à jour d'un utilisateur");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update user"
                }))
            }
        },
    }
}

/// DELETE /api/users?id=X - Supprime un utilisateur (admin uniquement).
/// Ses sessions sont supprimées d'abord, en best-effort: un échec est loggé
/// mais n'interrompt pas la suppression du compte.
pub async fn delete_user(
    auth_user: AuthUser,
    query: web::Query<DeleteUserQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if !auth_user.is_admin() {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Forbidden"
        }));
    }

    let Some(id) = query.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "User id is required"
        }));
    };

    if let Err(e) = sessions::Entity::delete_many()
        .filter(sessions::Column::UserId.eq(id))
        .exec(db.get_ref())
        .await
    {
        tracing::warn!(error = %e, user_id = id, "sessions non supprimées avant le compte");
    }

    match users::Entity::delete_many()
        .filter(users::Column::Id.eq(id))
        .exec(db.get_ref())
        .await
    {
        Ok(result) if result.rows_affected == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "User not found"
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "message": "User deleted successfully",
            "id": id
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la suppression d'un utilisateur");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to delete user"
            }))
        }
    }
}

pub fn users_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(get_users)
            .route("", web::put().to(update_user))
            .route("", web::delete().to(delete_user)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::SESSION_COOKIE;
    use crate::test_helpers::{mock_session, mock_user, TEST_TOKEN};
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};

    macro_rules! build_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db))
                    .configure(users_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_list_requires_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::get()
            .uri("/users")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_list_omits_password_hashes() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(9)]])
            .append_query_results([vec![mock_user(9, "admin")]])
            .append_query_results([vec![mock_user(1, "owner"), mock_user(2, "vet")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::get()
            .uri("/users")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total"], 2);
        assert!(body["users"][0].get("password").is_none());
    }

    #[actix_web::test]
    async fn test_update_blank_password_alone_is_no_fields() {
        // Un mot de passe vide est ignoré: sans autre champ, rien à mettre à jour
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(9)]])
            .append_query_results([vec![mock_user(9, "admin")]])
            .append_query_results([vec![mock_user(3, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/users")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "id": 3, "password": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "No fields to update");
    }

    #[actix_web::test]
    async fn test_update_email_conflict_is_409() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(9)]])
            .append_query_results([vec![mock_user(9, "admin")]])
            // la vérification d'unicité trouve un autre utilisateur
            .append_query_results([vec![mock_user(4, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/users")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "id": 3, "email": "user4@vetconnect.rw" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn test_delete_survives_session_cleanup_failure() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(9)]])
            .append_query_results([vec![mock_user(9, "admin")]])
            // la suppression des sessions échoue, celle du compte passe
            .append_exec_errors([DbErr::Custom("sessions table missing".to_string())])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::delete()
            .uri("/users?id=3")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_delete_unknown_user_is_404() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(9)]])
            .append_query_results([vec![mock_user(9, "admin")]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::delete()
            .uri("/users?id=424242")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
