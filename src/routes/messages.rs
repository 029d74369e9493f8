use actix_web::{get, post, web, HttpResponse};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::{messages, users};
use crate::services::notification_service::NotificationService;

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    pub user_id: Option<i32>,
    pub conversation_with: Option<i32>,
    pub unread_only: Option<bool>,
}

// DTO d'envoi - les trois champs sont requis
#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Option<i32>,
    pub receiver_id: Option<i32>,
    pub content: Option<String>,
}

// DTO de marquage lu: un id précis, ou le bulk {mark_as_read, receiver_id}
#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub id: Option<i32>,
    pub receiver_id: Option<i32>,
    pub mark_as_read: Option<bool>,
}

/// Les deux directions de la paire: (A→B) OU (B→A)
fn conversation_condition(user_id: i32, other_id: i32) -> Condition {
    Condition::any()
        .add(
            Condition::all()
                .add(messages::Column::SenderId.eq(user_id))
                .add(messages::Column::ReceiverId.eq(other_id)),
        )
        .add(
            Condition::all()
                .add(messages::Column::SenderId.eq(other_id))
                .add(messages::Column::ReceiverId.eq(user_id)),
        )
}

/// GET /api/messages - Lister les messages d'un utilisateur, ou une conversation
#[get("")]
pub async fn get_messages(
    _auth_user: AuthUser,
    query: web::Query<ListMessagesQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let mut select = messages::Entity::find();

    // Seuls les filtres réellement fournis restreignent le résultat
    if let Some(user_id) = query.user_id {
        if let Some(other_id) = query.conversation_with {
            select = select.filter(conversation_condition(user_id, other_id));
        } else {
            select = select.filter(
                Condition::any()
                    .add(messages::Column::SenderId.eq(user_id))
                    .add(messages::Column::ReceiverId.eq(user_id)),
            );
        }
    }

    if query.unread_only.unwrap_or(false) {
        select = select.filter(messages::Column::IsRead.eq(false));
        if let Some(user_id) = query.user_id {
            select = select.filter(messages::Column::ReceiverId.eq(user_id));
        }
    }

    match select
        .order_by_desc(messages::Column::Timestamp)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "messages": rows,
                "total": total
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des messages");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch messages"
            }))
        }
    }
}

/// POST /api/messages - Envoyer un message + notification pour le destinataire
#[post("")]
pub async fn send_message(
    _auth_user: AuthUser,
    body: web::Json<SendMessageRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (sender_id, receiver_id, content) = match (
        body.sender_id,
        body.receiver_id,
        body.content.filter(|c| !c.trim().is_empty()),
    ) {
        (Some(sender_id), Some(receiver_id), Some(content)) => (sender_id, receiver_id, content),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "sender_id, receiver_id and content are required"
            }));
        }
    };

    let new_message = messages::ActiveModel {
        sender_id: Set(sender_id),
        receiver_id: Set(receiver_id),
        content: Set(content),
        timestamp: Set(chrono::Utc::now().naive_utc()),
        is_read: Set(false),
        read_status: Set("sent".to_string()),
        ..Default::default()
    };

    let message = match new_message.insert(db.get_ref()).await {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "échec de l'envoi d'un message");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to send message"
            }));
        }
    };

    // Effet de bord: une notification pour le destinataire. Deuxième statement
    // indépendant: si cette insertion échoue, le message reste sans sa
    // notification (fenêtre d'incohérence assumée, voir DESIGN.md).
    let sender_name = match users::Entity::find_by_id(sender_id).one(db.get_ref()).await {
        Ok(Some(user)) => user.full_name,
        _ => format!("user #{}", sender_id),
    };
    if let Err(e) = NotificationService::notify(
        db.get_ref(),
        receiver_id,
        format!("New message from {}", sender_name),
        "message".to_string(),
    )
    .await
    {
        tracing::warn!(error = %e, "message inséré mais notification non créée");
    }

    HttpResponse::Created().json(serde_json::json!({
        "message": message,
        "message_sent": "Message sent successfully"
    }))
}

/// PUT /api/messages - Marquer lu: un message précis, ou tous ceux d'un destinataire
pub async fn mark_messages_read(
    _auth_user: AuthUser,
    body: web::Json<MarkReadRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    // Un id précis prime sur le flag bulk, quelle que soit sa valeur
    if let Some(id) = body.id {
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .col_expr(messages::Column::ReadStatus, Expr::value("read"))
            .filter(messages::Column::Id.eq(id))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) if result.rows_affected == 0 => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "Message not found"
                }))
            }
            Ok(result) => HttpResponse::Ok().json(serde_json::json!({
                "updated_count": result.rows_affected,
                "message": "Message marked as read"
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec du marquage d'un message");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to mark message as read"
                }))
            }
        };
    }

    if body.mark_as_read.unwrap_or(false) {
        let Some(receiver_id) = body.receiver_id else {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "receiver_id is required to mark all messages as read"
            }));
        };

        // Tous les messages non lus du destinataire, en un seul statement
        let result = messages::Entity::update_many()
            .col_expr(messages::Column::IsRead, Expr::value(true))
            .col_expr(messages::Column::ReadStatus, Expr::value("read"))
            .filter(messages::Column::ReceiverId.eq(receiver_id))
            .filter(messages::Column::IsRead.eq(false))
            .exec(db.get_ref())
            .await;

        return match result {
            Ok(result) => HttpResponse::Ok().json(serde_json::json!({
                "updated_count": result.rows_affected,
                "message": "Messages marked as read"
            })),
            Err(e) => {
                tracing::error!(error = %e, "échec du marquage bulk des messages");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to mark messages as read"
                }))
            }
        };
    }

    HttpResponse::BadRequest().json(serde_json::json!({
        "error": "Provide a message id, or mark_as_read with receiver_id"
    }))
}

pub fn messages_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/messages")
            .service(get_messages)
            .service(send_message)
            .route("", web::put().to(mark_messages_read)),
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
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};

    fn mock_message(id: i32, sender_id: i32, receiver_id: i32) -> messages::Model {
        messages::Model {
            id,
            sender_id,
            receiver_id,
            content: "Muraho! Inka yanjye irarwaye.".to_string(),
            timestamp: chrono::Utc::now().naive_utc(),
            is_read: false,
            read_status: "sent".to_string(),
        }
    }

    macro_rules! build_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db))
                    .configure(messages_routes),
            )
            .await
        };
    }

    #[::core::prelude::v1::test]
    fn test_conversation_condition_is_symmetric() {
        // Le SQL généré doit matcher les deux directions de la paire,
        // que l'on interroge A→B ou B→A
        let sql_ab = messages::Entity::find()
            .filter(conversation_condition(1, 2))
            .build(DatabaseBackend::Postgres)
            .to_string();
        let sql_ba = messages::Entity::find()
            .filter(conversation_condition(2, 1))
            .build(DatabaseBackend::Postgres)
            .to_string();

        for sql in [&sql_ab, &sql_ba] {
            assert!(sql.contains(r#""sender_id" = 1 AND "messages"."receiver_id" = 2"#));
            assert!(sql.contains(r#""sender_id" = 2 AND "messages"."receiver_id" = 1"#));
            assert!(sql.contains("OR"));
        }
    }

    #[actix_web::test]
    async fn test_send_missing_content_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/messages")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "sender_id": 1, "receiver_id": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_send_message_creates_notification() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            // INSERT du message
            .append_query_results([vec![mock_message(10, 1, 2)]])
            // lookup du nom de l'expéditeur
            .append_query_results([vec![mock_user(1, "owner")]])
            // INSERT de la notification (effet de bord)
            .append_query_results([vec![crate::models::notifications::Model {
                id: 3,
                user_id: 2,
                message: "New message from User 1".to_string(),
                notification_type: "message".to_string(),
                is_read: false,
                created_at: Some(chrono::Utc::now().naive_utc()),
            }]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/messages")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({
                "sender_id": 1,
                "receiver_id": 2,
                "content": "Muraho! Inka yanjye irarwaye."
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"]["read_status"], "sent");
        assert_eq!(body["message_sent"], "Message sent successfully");
    }

    #[actix_web::test]
    async fn test_bulk_mark_read_returns_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(2)]])
            .append_query_results([vec![mock_user(2, "vet")]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 5,
            }])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/messages")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "mark_as_read": true, "receiver_id": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["updated_count"], 5);
    }

    #[actix_web::test]
    async fn test_mark_read_without_id_or_flag_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::put()
            .uri("/messages")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_list_conversation_envelope() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .append_query_results([vec![mock_message(2, 2, 1), mock_message(1, 1, 2)]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::get()
            .uri("/messages?user_id=1&conversation_with=2")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total"], 2);
    }
}
