use actix_web::{get, post, web, HttpResponse};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::notifications;
use crate::services::notification_service::NotificationService;

#[derive(Deserialize)]
pub struct ListNotificationsQuery {
    pub user_id: Option<i32>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub unread_only: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Option<i32>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
}

// DTO de marquage lu: un id précis, ou le bulk {user_id, mark_all_read}
#[derive(Deserialize)]
pub struct MarkNotificationsRequest {
    pub id: Option<i32>,
    pub user_id: Option<i32>,
    pub mark_all_read: Option<bool>,
}

#[derive(Deserialize)]
pub struct DeleteNotificationsQuery {
    pub id: Option<i32>,
    pub user_id: Option<i32>,
    pub delete_all: Option<bool>,
}

/// GET /api/notifications - Lister, avec unread_count dérivé en mémoire
#[get("")]
pub async fn get_notifications(
    _auth_user: AuthUser,
    query: web::Query<ListNotificationsQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let mut select = notifications::Entity::find();

    if let Some(user_id) = query.user_id {
        select = select.filter(notifications::Column::UserId.eq(user_id));
    }
    if let Some(ref notification_type) = query.notification_type {
        select = select.filter(
            notifications::Column::NotificationType.eq(notification_type.as_str()),
        );
    }
    if query.unread_only.unwrap_or(false) {
        select = select.filter(notifications::Column::IsRead.eq(false));
    }

    match select
        .order_by_desc(notifications::Column::CreatedAt)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            // unread_count dérivé des lignes déjà chargées, pas d'une
            // deuxième requête
            let unread_count = rows.iter().filter(|n| !n.is_read).count();
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "notifications": rows,
                "total": total,
                "unread_count": unread_count
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des notifications");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch notifications"
            }))
        }
    }
}

/// POST /api/notifications - Créer une notification (annonces admin, etc.)
#[post("")]
pub async fn create_notification(
    _auth_user: AuthUser,
    body: web::Json<CreateNotificationRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (user_id, message) = match (body.user_id, body.message.filter(|m| !m.trim().is_empty())) {
        (Some(user_id), Some(message)) => (user_id, message),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "user_id and message are required"
            }));
        }
    };

    let notification_type = body
        .notification_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "general".to_string());

    match NotificationService::notify(db.get_ref(), user_id, message, notification_type).await {
        Ok(notification) => HttpResponse::Created().json(serde_json::json!({
            "message": "Notification created successfully",
            "notification": notification
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la création d'une notification");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create notification"
            }))
        }
    }
}

/// PUT /api/notifications - Marquer lu: une notification, ou toutes celles d'un user
pub async fn mark_notifications_read(
    _auth_user: AuthUser,
    body: web::Json<MarkNotificationsRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    if let Some(id) = body.id {
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::Id.eq(id))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) if result.rows_affected == 0 => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Notification not found"
                }))
            }
            Ok(result) => HttpResponse::Ok().json(serde_json::json!({
                "updated_count": result.rows_affected,
                "message": "Notification marked as read"
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec du marquage d'une notification");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to mark notification as read"
                }))
            }
        };
    }

    if body.mark_all_read.unwrap_or(false) {
        let Some(user_id) = body.user_id else {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "user_id is required to mark all notifications as read"
            }));
        };

        // Scopé strictement par user_id: jamais les notifications des autres
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::UserId.eq(user_id))
            .filter(notifications::Column::IsRead.eq(false))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) => HttpResponse::Ok().json(serde_json::json!({
                "updated_count": result.rows_affected,
                "message": "All notifications marked as read"
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec du marquage bulk des notifications");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to mark notifications as read"
                }))
            }
        };
    }

    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "Provide a notification id, or mark_all_read with user_id"
    }))
}

/// DELETE /api/notifications - Une notification précise, ou toutes celles d'un user
pub async fn delete_notifications(
    _auth_user: AuthUser,
    query: web::Query<DeleteNotificationsQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if let Some(id) = query.id {
        let result = notifications::Entity::delete_many()
            .filter(notifications::Column::Id.eq(id))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) if result.rows_affected == 0 => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Notification not found"
                }))
            }
            Ok(_) => HttpResponse::Ok().json(serde_json::json!({
                "message": "Notification deleted successfully",
                "id": id
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec de la suppression d'une notification");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to delete notification"
                }))
            }
        };
    }

    if query.delete_all.unwrap_or(false) {
        let Some(user_id) = query.user_id else {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "user_id is required to delete all notifications"
            }));
        };

        let result = notifications::Entity::delete_many()
            .filter(notifications::Column::UserId.eq(user_id))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) => HttpResponse::Ok().json(serde_json::json!({
                "deleted_count": result.rows_affected,
                "message": "All notifications deleted"
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec de la suppression bulk des notifications");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to delete notifications"
                }))
            }
        };
    }

    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "Provide a notification id, or delete_all with user_id"
    }))
}

pub fn notifications_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .service(get_notifications)
            .service(create_notification)
            .route("", web::put().to(mark_notifications_read))
            .route("", web::delete().to(delete_notifications)),
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
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn mock_notification(id: i32, user_id: i32, is_read: bool) -> notifications::Model {
        notifications::Model {
            id,
            user_id,
            message: "Your appointment was confirmed".to_string(),
            notification_type: "appointment".to_string(),
            is_read,
            created_at: Some(chrono::Utc::now().naive_utc()),
        }
    }

    macro_rules! build_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db))
                    .configure(notifications_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_list_derives_unread_count() {
        let rows = vec![
            mock_notification(3, 1, false),
            mock_notification(2, 1, true),
            mock_notification(1, 1, false),
        ];
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .append_query_results([rows])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::get()
            .uri("/notifications?user_id=1")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["unread_count"], 2);
        assert_eq!(body["notifications"][0]["type"], "appointment");
    }

    #[actix_web::test]
    async fn test_mark_all_read_returns_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 5,
            }])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/notifications")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "user_id": 1, "mark_all_read": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["updated_count"], 5);
    }

    #[actix_web::test]
    async fn test_mark_all_read_without_user_id_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/notifications")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "mark_all_read": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_delete_all_scoped_by_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 7,
            }])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::delete()
            .uri("/notifications?user_id=1&delete_all=true")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["deleted_count"], 7);
    }

    #[actix_web::test]
    async fn test_delete_unknown_id_is_404() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::delete()
            .uri("/notifications?id=424242")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
