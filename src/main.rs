use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use mealtrack::api::{self, AppState};
use mealtrack::auth::{bootstrap_admin, AuthService};
use mealtrack::config::Config;
use mealtrack::store::Store;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(io::Error::other)?;

    // Initialize store
    let store = Arc::new(Store::new(&config.database_path).map_err(io::Error::other)?);
    log::info!("Database: {}", config.database_path);

    // Initialize auth service
    let auth_service = Arc::new(
        AuthService::new(config.jwt_secret.clone()).with_token_ttl(config.token_ttl),
    );

    // Create or promote the admin user from environment variables
    if let Some(ref admin) = config.admin {
        bootstrap_admin(&store, &auth_service, admin).map_err(io::Error::other)?;
    }

    let state = web::Data::new(AppState {
        store,
        auth_service,
    });

    log::info!(
        "Starting mealtrack server on {}:{}",
        config.bind_address,
        config.port
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
