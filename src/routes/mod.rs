pub mod health;
pub mod auth;
pub mod profile;
pub mod users;
pub mod animals;
pub mod appointments;
pub mod medical_records;
pub mod messages;
pub mod notifications;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(profile::profile_routes)
            .configure(users::users_routes)
            .configure(animals::animals_routes)
            .configure(appointments::appointments_routes)
            .configure(medical_records::medical_records_routes)
            .configure(messages::messages_routes)
            .configure(notifications::notifications_routes),
    );
}
