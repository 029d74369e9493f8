use actix_web::{get, post, web, HttpResponse};
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde::Deserialize;

use crate::middleware::AuthUser;
use crate::models::animals;

// DTO de création - les clés sont en camelCase côté API (birthDate, idNumber...)
// et traduites vers les colonnes snake_case par cette allow-list serde
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnimalRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub animal_type: Option<String>,
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub id_number: Option<String>,
    pub color: Option<String>,
    pub weight: Option<f64>,
    pub health_status: Option<String>,
    pub notes: Option<String>,
}

// DTO de mise à jour partielle: seuls les champs présents entrent dans le SET
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnimalRequest {
    pub id: Option<i32>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub animal_type: Option<String>,
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub id_number: Option<String>,
    pub color: Option<String>,
    pub weight: Option<f64>,
    pub health_status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ListAnimalsQuery {
    pub owner_id: Option<i32>, // honoré pour les admins seulement
    #[serde(rename = "type")]
    pub animal_type: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteAnimalQuery {
    pub id: Option<i32>,
}

/// GET /api/animals - Lister les animaux (les siens, ou filtrés pour un admin)
#[get("")]
pub async fn get_animals(
    auth_user: AuthUser,
    query: web::Query<ListAnimalsQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let mut select = animals::Entity::find();

    // Un propriétaire ne voit que ses animaux; un admin peut cibler un owner_id
    if auth_user.is_admin() {
        if let Some(owner_id) = query.owner_id {
            select = select.filter(animals::Column::OwnerId.eq(owner_id));
        }
    } else {
        select = select.filter(animals::Column::OwnerId.eq(auth_user.user_id));
    }

    if let Some(ref animal_type) = query.animal_type {
        select = select.filter(animals::Column::AnimalType.eq(animal_type.as_str()));
    }

    match select
        .order_by_desc(animals::Column::CreatedAt)
        .all(db.get_ref())
        .await
    {
        Ok(rows) => {
            let total = rows.len();
            HttpResponse::Ok().json(serde_json::json!({
                "animals": rows,
                "total": total
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "échec de la liste des animaux");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch animals"
            }))
        }
    }
}

/// POST /api/animals - Enregistrer un animal pour l'utilisateur connecté
#[post("")]
pub async fn create_animal(
    auth_user: AuthUser,
    body: web::Json<CreateAnimalRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    // Champs requis - validés avant de toucher à la base
    let (name, animal_type) = match (
        body.name.filter(|v| !v.trim().is_empty()),
        body.animal_type.filter(|v| !v.trim().is_empty()),
    ) {
        (Some(name), Some(animal_type)) => (name, animal_type),
        _ => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Name and type are required"
            }));
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let new_animal = animals::ActiveModel {
        owner_id: Set(auth_user.user_id),
        name: Set(name),
        animal_type: Set(animal_type),
        breed: Set(body.breed),
        gender: Set(body.gender),
        birth_date: Set(body.birth_date),
        identification_number: Set(body.id_number),
        color: Set(body.color),
        weight: Set(body.weight),
        health_status: Set(body.health_status.unwrap_or_else(|| "healthy".to_string())),
        notes: Set(body.notes),
        created_at: Set(Some(now)),
        updated_at: Set(Some(now)),
        ..Default::default()
    };

    match new_animal.insert(db.get_ref()).await {
        Ok(animal) => HttpResponse::Created().json(serde_json::json!({
            "message": "Animal registered successfully",
            "animal": {
                "id": animal.id,
                "name": animal.name,
                "type": animal.animal_type,
                "health_status": animal.health_status,
                "created_at": animal.created_at
            }
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "An animal with this identification number already exists"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la création d'un animal");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to register animal"
                }))
            }
        },
    }
}

/// PUT /api/animals - Mise à jour partielle, réservée au propriétaire (ou admin)
pub async fn update_animal(
    auth_user: AuthUser,
    body: web::Json<UpdateAnimalRequest>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let body = body.into_inner();

    let Some(id) = body.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Animal id is required"
        }));
    };

    // 1. Charger l'animal, scopé par propriétaire sauf pour un admin.
    // Un id existant mais appartenant à un autre propriétaire donne le même
    // 404 qu'un id inconnu.
    let mut select = animals::Entity::find_by_id(id);
    if !auth_user.is_admin() {
        select = select.filter(animals::Column::OwnerId.eq(auth_user.user_id));
    }

    let animal = match select.one(db.get_ref()).await {
        Ok(Some(animal)) => animal,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Animal not found"
            }));
        }
        Err(e) => {
            tracing::error!(error = %e, "échec du chargement d'un animal");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to update animal"
            }));
        }
    };

    // 2. Mise à jour partielle: seuls les champs fournis entrent dans le SET
    let mut active: animals::ActiveModel = animal.into();
    let mut updated_fields = 0;

    if let Some(name) = body.name {
        active.name = Set(name);
        updated_fields += 1;
    }
    if let Some(animal_type) = body.animal_type {
        active.animal_type = Set(animal_type);
        updated_fields += 1;
    }
    if let Some(breed) = body.breed {
        active.breed = Set(Some(breed));
        updated_fields += 1;
    }
    if let Some(gender) = body.gender {
        active.gender = Set(Some(gender));
        updated_fields += 1;
    }
    if let Some(birth_date) = body.birth_date {
        active.birth_date = Set(Some(birth_date));
        updated_fields += 1;
    }
    if let Some(id_number) = body.id_number {
        active.identification_number = Set(Some(id_number));
        updated_fields += 1;
    }
    if let Some(color) = body.color {
        active.color = Set(Some(color));
        updated_fields += 1;
    }
    if let Some(weight) = body.weight {
        active.weight = Set(Some(weight));
        updated_fields += 1;
    }
    if let Some(health_status) = body.health_status {
        active.health_status = Set(health_status);
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

    active.updated_at = Set(Some(chrono::Utc::now().naive_utc()));

    match active.update(db.get_ref()).await {
        Ok(animal) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Animal updated successfully",
            "animal": animal
        })),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "An animal with this identification number already exists"
                }))
            }
            _ => {
                tracing::error!(error = %e, "échec de la mise à jour d'un animal");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Failed to update animal"
                }))
            }
        },
    }
}

/// DELETE /api/animals?id=X - Suppression scopée id + owner_id
pub async fn delete_animal(
    auth_user: AuthUser,
    query: web::Query<DeleteAnimalQuery>,
    db: web::Data<DatabaseConnection>,
) -> HttpResponse {
    let Some(id) = query.id else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Animal id is required"
        }));
    };

    let mut delete = animals::Entity::delete_many().filter(animals::Column::Id.eq(id));
    if !auth_user.is_admin() {
        delete = delete.filter(animals::Column::OwnerId.eq(auth_user.user_id));
    }

    match delete.exec(db.get_ref()).await {
        Ok(result) if result.rows_affected == 0 => {
            // Id inconnu ou animal d'un autre propriétaire: indistinguable
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "Animal not found"
            }))
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Animal deleted successfully",
            "id": id
        })),
        Err(e) => {
            tracing::error!(error = %e, "échec de la suppression d'un animal");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to delete animal"
            }))
        }
    }
}

pub fn animals_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/animals")
            .service(get_animals)
            .service(create_animal)
            .route("", web::put().to(update_animal))
            .route("", web::delete().to(delete_animal)),
    );
}
