use actix_web::{get, post, web, HttpResponse};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::medical_records;

#[derive(Deserialize)]
pub struct ListMedicalRecordsQuery {
    pub animal_id: Option<i32>,
    pub vet_id: Option<i32>,
}

// DTO de création - vet_id est l'appelant (un admin peut le fournir)
#[derive(Deserialize)]
pub struct CreateMedicalRecordRequest {
    pub animal_id: Option<i32>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub vet_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct UpdateMedicalRecordRequest {
    pub id: Option<i32>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteMedicalRecordQuery {
    pub id: Option<i32>,
}

/// GET /api/medical-records - Lister avec filtres optionnels
#[get("")]
pub async fn get_medical_records(
    _auth_user: AuthUser,
    query: web::Query<ListMedicalRecordsQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let mut select = medical_records::Entity::find();

    if let Some(animal_id) = query.animal_id {
        select = select.filter(medical_records::Column::AnimalId.eq(animal_id));
    }
    if let Some(vet_id) = query.vet_id {
        select = select.filter(medical_records::Column::VetId.eq(vet_id));
    }

    match select
        .order_by_desc(medical_records::Column::CreatedAt)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "medical_records": rows,
                "total": total
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des dossiers médicaux");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch medical records"
            }))
        }
    }
}

/// POST /api/medical-records - Réservé aux vétérinaires (et admins)
#[post("")]
pub async fn create_medical_record(
    auth_user: AuthUser,
    body: web::Json<CreateMedicalRecordRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if !auth_user.is_vet() && !auth_user.is_admin() {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Forbidden"
        }));
    }

    let body = body.into_inner();

    let (animal_id, diagnosis, treatment) = match (
        body.animal_id,
        body.diagnosis.filter(|v| !v.trim().is_empty()),
        body.treatment.filter(|v| !v.trim().is_empty()),
    ) {
        (Some(animal_id), Some(diagnosis), Some(treatment)) => (animal_id, diagnosis, treatment),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "animal_id, diagnosis and treatment are required"
            }));
        }
    };

    // Un admin peut créer au nom d'un vétérinaire via body.vet_id
    let vet_id = if auth_user.is_admin() {
        body.vet_id.unwrap_or(auth_user.user_id)
    } else {
        auth_user.user_id
    };

    let new_record = medical_records::ActiveModel {
        animal_id: Set(animal_id),
        vet_id: Set(vet_id),
        diagnosis: Set(diagnosis),
        treatment: Set(treatment),
        notes: Set(body.notes),
        created_at: Set(Some(chrono::Utc::now().naive_utc())),
        ..Default::default()
    };

    match new_record.insert(db.get_ref()).await {
        Ok(record) => HttpResponse::Created().json(serde_json::json!({
            "message": "Medical record created successfully",
            "medical_record": record
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Unknown animal or vet reference"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la création d'un dossier médical");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to create medical record"
                }))
            }
        },
    }
}

/// PUT /api/medical-records - Mise à jour partielle par le vétérinaire auteur
pub async fn update_medical_record(
    auth_user: AuthUser,
    body: web::Json<UpdateMedicalRecordRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let Some(id) = body.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Medical record id is required"
        }));
    };

    let mut select = medical_records::Entity::find_by_id(id);
    if !auth_user.is_admin() {
        select = select.filter(medical_records::Column::VetId.eq(auth_user.user_id));
    }

    let record = match select.one(db.get_ref()).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Medical record not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement d'un dossier médical");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update medical record"
            }));
        }
    };

    let mut active: medical_records::ActiveModel = record.into();
    let mut updated_fields = 0;

    if let Some(diagnosis) = body.diagnosis {
        active.diagnosis = Set(diagnosis);
        updated_fields += 1;
    }
    if let Some(treatment) = body.treatment {
        active.treatment = Set(treatment);
        updated_fields += 1;
    }
    if let Some(notes) = body.notes {
        active.notes = Set(Some(notes));
        updated_fields += 1;
    }

    if updated_fields == 0 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No fields to update"
        }));
    }

    match active.update(db.get_ref()).await {
        Ok(record) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Medical record updated successfully",
            "medical_record": record
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la mise à jour d'un dossier médical");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update medical record"
            }))
        }
    }
}

/// DELETE /api/medical-records?id=X - Admin uniquement
pub async fn delete_medical_record(
    auth_user: AuthUser,
    query: web::Query<DeleteMedicalRecordQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    if !auth_user.is_admin() {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Forbidden"
        }));
    }

    let Some(id) = query.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Medical record id is required"
        }));
    };

    match medical_records::Entity::delete_many()
        .filter(medical_records::Column::Id.eq(id))
        .exec(db.get_ref())
        .await
    {
        Ok(result) if result.rows_affected == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "Medical record not found"
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Medical record deleted successfully",
            "id": id
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la suppression d'un dossier médical");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to delete medical record"
            }))
        }
    }
}

pub fn medical_records_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/medical-records")
            .service(get_medical_records)
            .service(create_medical_record)
            .route("", web::put().to(update_medical_record))
            .route("", web::delete().to(delete_medical_record)),
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
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn mock_record(id: i32, vet_id: i32) -> medical_records::Model {
        medical_records::Model {
            id,
            animal_id: 3,
            vet_id,
            diagnosis: "East Coast fever".to_string(),
            treatment: "Buparvaquone, repos".to_string(),
            notes: None,
            created_at: Some(chrono::Utc::now().naive_utc()),
        }
    }

    macro_rules! build_app {
        ($db:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($db))
                    .configure(medical_records_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_owner_cannot_create_record() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(1)]])
            .append_query_results([vec![mock_user(1, "owner")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/medical-records")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({
                "animal_id": 3,
                "diagnosis": "x",
                "treatment": "y"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_vet_creates_record() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(2)]])
            .append_query_results([vec![mock_user(2, "vet")]])
            .append_query_results([vec![mock_record(1, 2)]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/medical-records")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({
                "animal_id": 3,
                "diagnosis": "East Coast fever",
                "treatment": "Buparvaquone, repos"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["medical_record"]["vet_id"], 2);
    }

    #[actix_web::test]
    async fn test_create_missing_diagnosis_is_400() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(2)]])
            .append_query_results([vec![mock_user(2, "vet")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::post()
            .uri("/medical-records")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .set_json(serde_json::json!({ "animal_id": 3, "treatment": "y" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_delete_requires_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![mock_session(2)]])
            .append_query_results([vec![mock_user(2, "vet")]])
            .into_connection();
        let app = build_app!(db);

        let req = test::TestRequest::delete()
            .uri("/medical-records?id=1")
            .cookie(Cookie::new(SESSION_COOKIE, TEST_TOKEN))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
