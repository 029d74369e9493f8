use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "appointments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32, // le propriétaire qui demande le rendez-vous
    pub vet_id: i32, // le vétérinaire sollicité
    pub animal_id: i32,
    pub appointment_date: DateTime,
    pub status: String, // "pending", "confirmed", "completed", "cancelled"
    pub payment_status: String, // "unpaid", "paid" - évolue indépendamment du status
    pub payment_reference_id: Option<String>,
    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // Deux FK vers users (owner et vet): pas d'impl Related, on filtre par colonne
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Owner,

    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::VetId",
        to = "super::users::Column::Id"
    )]
    Vet,

    #[sea_orm(
        belongs_to = "super::animals::Entity",
        from = "Column::AnimalId",
        to = "super::animals::Column::Id"
    )]
    Animal,
}

impl Related<super::animals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Animal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
