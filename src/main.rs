mod models;
mod routes;
mod db;
mod services;
mod utils;
mod middleware;

#[cfg(test)]
mod test_helpers;

use actix_web::{App, HttpServer, web};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("🔌 Connecting to database...");
    let db = db::establish_connection()
        .await
        .expect("Failed to connect to database");
    tracing::info!("✅ Database connected!");
    let db = web::Data::new(db);

    let email_service = web::Data::new(services::email_service::EmailService::from_env());

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    tracing::info!("🚀 Starting server on http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(email_service.clone())
            .configure(routes::configure_routes)
    })
        .bind((host, port))?
        .run()
        .await
}
