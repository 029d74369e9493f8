use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String, // handle unique, toujours en minuscules
    pub full_name: String,
    #[sea_orm(unique)]
    pub email: String, // stocké en minuscules
    pub phone: Option<String>, // Format: +250XXXXXXXXX
    pub address: Option<String>,
    pub role: String, // "admin", "vet" ou "owner"
    #[serde(skip_serializing)] // Ne jamais exposer le hash en JSON
    pub password: String, // Format: pbkdf2:sha256:iterations$salt$hash
    pub email_verified: bool,
    pub created_at: Option<DateTime>,
    pub last_login: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sessions::Entity")]
    Sessions,

    #[sea_orm(has_many = "super::animals::Entity")]
    Animals,

    #[sea_orm(has_many = "super::notifications::Entity")]
    Notifications,
}

impl Related<super::sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::animals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Animals.def()
    }
}

impl Related<super::notifications::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
