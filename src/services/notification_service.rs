use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};

use crate::models::notifications;

pub struct NotificationService;

impl NotificationService {
    /// Crée une notification pour un utilisateur.
    /// Point d'entrée unique: POST /api/notifications et l'effet de bord
    /// de POST /api/messages passent tous les deux par ici.
    pub async fn notify(
        db: &DatabaseConnection,
        user_id: i32,
        message: String,
        notification_type: String,
    ) -> Result<notifications::Model, DbErr> {
        let new_notification = notifications::ActiveModel {
            user_id: Set(user_id),
            message: Set(message),
            notification_type: Set(notification_type),
            is_read: Set(false),
            created_at: Set(Some(chrono::Utc::now().naive_utc())),
            ..Default::default()
        };

        new_notification.insert(db).await
    }
}
