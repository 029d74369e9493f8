use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

// Dossier médical en append-mostly: créé par un vétérinaire,
// seuls diagnosis/treatment/notes sont modifiables ensuite.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "medical_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub animal_id: i32,
    pub vet_id: i32,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: Option<String>,
    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::animals::Entity",
        from = "Column::AnimalId",
        to = "super::animals::Column::Id"
    )]
    Animal,

    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::VetId",
        to = "super::users::Column::Id"
    )]
    Vet,
}

impl Related<super::animals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Animal.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
