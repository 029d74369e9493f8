use actix_web::{get, post, web, HttpResponse};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::appointments;
use crate::utils::validation::{VALID_APPOINTMENT_STATUSES, VALID_PAYMENT_STATUSES};

#[derive(Deserialize)]
pub struct ListAppointmentsQuery {
    pub user_id: Option<i32>,
    pub vet_id: Option<i32>,
    pub animal_id: Option<i32>,
    pub status: Option<String>,
}

// DTO de création - user_id facultatif: par défaut, l'appelant
#[derive(Deserialize)]
pub struct CreateAppointmentRequest {
    pub vet_id: Option<i32>,
    pub animal_id: Option<i32>,
    pub appointment_date: Option<NaiveDateTime>,
    pub user_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct UpdateAppointmentRequest {
    pub id: Option<i32>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_reference_id: Option<String>,
    pub appointment_date: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
pub struct DeleteAppointmentQuery {
    pub id: Option<i32>,
}

/// Un non-admin ne voit/modifie que les rendez-vous où il est partie prenante
fn participant_condition(user_id: i32) -> Condition {
    Condition::any()
        .add(appointments::Column::UserId.eq(user_id))
        .add(appointments::Column::VetId.eq(user_id))
}

/// GET /api/appointments - Lister avec filtres optionnels ANDés
#[get("")]
pub async fn get_appointments(
    auth_user: AuthUser,
    query: web::Query<ListAppointmentsQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let mut select = appointments::Entity::find();

    if !auth_user.is_admin() {
        select = select.filter(participant_condition(auth_user.user_id));
    }
    if let Some(user_id) = query.user_id {
        select = select.filter(appointments::Column::UserId.eq(user_id));
    }
    if let Some(vet_id) = query.vet_id {
        select = select.filter(appointments::Column::VetId.eq(vet_id));
    }
    if let Some(animal_id) = query.animal_id {
        select = select.filter(appointments::Column::AnimalId.eq(animal_id));
    }
    if let Some(ref status) = query.status {
        select = select.filter(appointments::Column::Status.eq(status.as_str()));
    }

    match select
        .order_by_desc(appointments::Column::CreatedAt)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "appointments": rows,
                "total": total
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des rendez-vous");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch appointments"
            }))
        }
    }
}

/// POST /api/appointments - Demander un rendez-vous (status pending, unpaid)
#[post("")]
pub async fn create_appointment(
    auth_user: AuthUser,
    body: web::Json<CreateAppointmentRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let (vet_id, animal_id, appointment_date) =
        match (body.vet_id, body.animal_id, body.appointment_date) {
            (Some(vet_id), Some(animal_id), Some(date)) => (vet_id, animal_id, date),
            _ => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "vet_id, animal_id and appointment_date are required"
                }));
            }
        };

    let new_appointment = appointments::ActiveModel {
        user_id: Set(body.user_id.unwrap_or(auth_user.user_id)),
        vet_id: Set(vet_id),
        animal_id: Set(animal_id),
        appointment_date: Set(appointment_date),
        status: Set("pending".to_string()),
        payment_status: Set("unpaid".to_string()),
        payment_reference_id: Set(None),
        created_at: Set(Some(chrono::Utc::now().naive_utc())),
        ..Default::default()
    };

    match new_appointment.insert(db.get_ref()).await {
        Ok(appointment) => HttpResponse::Created().json(serde_json::json!({
            "message": "Appointment requested successfully",
            "appointment": appointment
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Unknown vet, animal or user reference"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la création d'un rendez-vous");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to create appointment"
                }))
            }
        },
    }
}

/// PUT /api/appointments - Transitions de statut et de paiement (partiel)
pub async fn update_appointment(
    auth_user: AuthUser,
    body: web::Json<UpdateAppointmentRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let Some(id) = body.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Appointment id is required"
        }));
    };

    // Valider les enums avant de toucher à la base
    if let Some(ref status) = body.status {
        if !VALID_APPOINTMENT_STATUSES.contains(&status.as_str()) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid status. Must be one of: pending, confirmed, completed, cancelled"
            }));
        }
    }
    if let Some(ref payment_status) = body.payment_status {
        if !VALID_PAYMENT_STATUSES.contains(&payment_status.as_str()) {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid payment_status. Must be one of: unpaid, paid"
            }));
        }
    }

    let mut select = appointments::Entity::find_by_id(id);
    if !auth_user.is_admin() {
        select = select.filter(participant_condition(auth_user.user_id));
    }

    let appointment = match select.one(db.get_ref()).await {
        Ok(Some(appointment)) => appointment,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Appointment not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement d'un rendez-vous");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update appointment"
            }));
        }
    };

    let mut active: appointments::ActiveModel = appointment.into();
    let mut updated_fields = 0;

    if let Some(status) = body.status {
        active.status = Set(status);
        updated_fields += 1;
    }
    // payment_status évolue indépendamment du status
    if let Some(payment_status) = body.payment_status {
        active.payment_status = Set(payment_status);
        updated_fields += 1;
    }
    if let Some(payment_reference_id) = body.payment_reference_id {
        active.payment_reference_id = Set(Some(payment_reference_id));
        updated_fields += 1;
    }
    if let Some(appointment_date) = body.appointment_date {
        active.appointment_date = Set(appointment_date);
        updated_fields += 1;
    }

    if updated_fields == 0 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No fields to update"
        }));
    }

    match active.update(db.get_ref()).await {
        Ok(appointment) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Appointment updated successfully",
            "appointment": appointment
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la mise à jour d'un rendez-vous");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update appointment"
            }))
        }
    }
}

/// DELETE /api/appointments?id=X - Scopé aux parties prenantes (sauf admin)
pub async fn delete_appointment(
    auth_user: AuthUser,
    query: web::Query<DeleteAppointmentQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let Some(id) = query.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Appointment id is required"
        }));
    };

    let mut delete = appointments::Entity::delete_many().filter(appointments::Column::Id.eq(id));
    if !auth_user.is_admin() {
        delete = delete.filter(participant_condition(auth_user.user_id));
    }

    match delete.exec(db.get_ref()).await {
        Ok(result) if result.rows_affected == 0 => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "Appointment not found"
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Appointment deleted successfully",
            "id": id
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la suppression d'un rendez-vous");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to delete appointment"
            }))
        }
    }
}

pub fn appointments_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/appointments")
            .service(get_appointments)
            .service(create_appointment)
            .route("", web::put().to(update_appointment))
            .route("", web::delete().to(delete_appointment)),
    );
}
