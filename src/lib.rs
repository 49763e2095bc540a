pub mod audio_probe;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod profanity;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod signing;
pub mod translation;

use std::env;

use config::AppConfig;
use db::Db;
use events::EventBus;
use rate_limit::{RateLimitConfig, RateLimiter};
use rocket_cors::CorsOptions;
use signing::UrlSigner;
use translation::{NoopTranslationProvider, TranslationCache, TranslationProvider};

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/chat.db".to_string());
    rocket_with_db(&db_path)
}

pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    rocket_with_db_and_config(db_path, RateLimitConfig::from_env())
}

pub fn rocket_with_db_and_config(db_path: &str, rate_limit_config: RateLimitConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(db_path, rate_limit_config, AppConfig::from_env())
}

fn build_rocket(db_path: &str, rate_limit_config: RateLimitConfig, app_config: AppConfig) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Db::new(db_path);
    let events = EventBus::new();
    let rate_limiter = RateLimiter::new();
    let sessions = auth::SessionStore::new();
    let translation_cache =
        TranslationCache::with_limits(app_config.rate_limit_translate, app_config.rate_limit_translate_per_lang);
    let translation_provider: Box<dyn TranslationProvider> = Box::new(NoopTranslationProvider);
    let signer = UrlSigner::new(app_config.url_signing_secret.clone());

    // Retention worker gets its own connection to the same file rather than
    // sharing the request-serving `Mutex<Connection>` (spec.md §4.4), the
    // same isolation the teacher gives its background retention task.
    services::retention::spawn(
        db_path.to_string(),
        events.sender.clone(),
        services::retention::RetentionSettings {
            free_retention_days: app_config.free_retention_days,
            premium_retention_days: app_config.premium_retention_days,
            batch: app_config.expire_job_batch,
            interval_ms: app_config.expire_job_interval_ms,
            url_signing_secret: app_config.url_signing_secret.clone(),
            signed_url_ttl_secs: app_config.signed_url_ttl_secs,
        },
    );

    let cors = CorsOptions::default().to_cors().expect("Failed to create CORS");

    rocket::build()
        .manage(db)
        .manage(events)
        .manage(app_config)
        .manage(rate_limit_config)
        .manage(rate_limiter)
        .manage(sessions)
        .manage(translation_cache)
        .manage(translation_provider)
        .manage(signer)
        .attach(cors)
        .register("/", rocket::catchers![routes::too_many_requests, routes::not_found])
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::stats,
                routes::register,
                routes::login,
                routes::two_factor_login,
                routes::logout,
                routes::me,
                routes::forgot_password,
                routes::reset_password,
                routes::create_room,
                routes::list_participants,
                routes::add_participant,
                routes::change_role,
                routes::promote_participant,
                routes::kick_participant,
                routes::leave_room,
                routes::typing_update,
                routes::create_invite,
                routes::join_invite,
                routes::send_message,
                routes::get_messages,
                routes::edit_message,
                routes::delete_message,
                routes::clear_messages,
                routes::clear_all_messages,
                routes::schedule_message,
                routes::forward_message,
                routes::add_reaction,
                routes::remove_reaction,
                routes::mark_read,
                routes::notify_copied,
                routes::read_bulk,
                routes::search_messages,
                routes::room_stream,
                routes::intent_upload,
                routes::complete_upload,
                routes::upload_multipart,
                routes::download_upload,
            ],
        )
}
