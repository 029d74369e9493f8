use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "animals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: i32,
    pub name: String,
    #[serde(rename = "type")]
    #[sea_orm(column_name = "type")]
    pub animal_type: String, // "cow", "goat", "chicken", etc.
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<Date>,
    #[sea_orm(unique)]
    pub identification_number: Option<String>, // numéro de boucle, unique si présent
    pub color: Option<String>,
    pub weight: Option<f64>, // en kg
    pub health_status: String, // libre, "healthy" par défaut
    pub notes: Option<String>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id"
    )]
    Owner,

    #[sea_orm(has_many = "super::medical_records::Entity")]
    MedicalRecords,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::medical_records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MedicalRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
