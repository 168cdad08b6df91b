use actix::System;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use gc_server::{
    coordinator::HttpCoordinator,
    env::Settings,
    match_tracker::{messages::GetMatchSnapshot, spawn_match_tracker},
    reliable::messages::GetQueueStatus,
    session::GcSession,
    AppState, LoggerManager,
};
use prometheus::{Encoder, TextEncoder};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

async fn metrics_route(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(expected_token) = &state.settings.server.metrics_auth_token {
        let provided_token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        if provided_token != Some(expected_token.as_str()) {
            return HttpResponse::Unauthorized().body("Unauthorized: Invalid or missing token");
        }
    }

    let metric_families = state.metrics_registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("Metrics encode error: {}", e));
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

// 코디네이터 세션이 없으면 준비되지 않은 것으로 본다
async fn ready_route(state: web::Data<AppState>) -> HttpResponse {
    if state.session.is_connected() {
        HttpResponse::Ok().body("READY")
    } else {
        HttpResponse::ServiceUnavailable().body("COORDINATOR UNAVAILABLE")
    }
}

async fn queue_status_route(state: web::Data<AppState>) -> HttpResponse {
    match state.session.queue.send(GetQueueStatus).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => {
            error!("Failed to query reliable queue: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn match_status_route(state: web::Data<AppState>) -> HttpResponse {
    match state.tracker_addr.send(GetMatchSnapshot).await {
        Ok(Some(info)) => HttpResponse::Ok().json(info),
        Ok(None) => HttpResponse::NotFound().body("No active match"),
        Err(e) => {
            error!("Failed to query match tracker: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 1. 환경변수 로드
    dotenv::dotenv().ok();

    // 2. 설정 파일 로드
    let settings = Settings::new().expect("Failed to load settings");

    // 3. 로거 초기화
    let logger_manager = Arc::new(LoggerManager::setup(&settings));

    // 4. Metrics 등록
    let metrics_registry = prometheus::Registry::new();
    metrics::register_custom_metrics(&metrics_registry)
        .expect("Failed to register custom metrics");
    info!("Metrics initialized and registered");

    // 5. 전역 Shutdown Token 생성
    let shutdown_token = CancellationToken::new();

    // 6. 코디네이터 연결 + heartbeat
    let coordinator = Arc::new(HttpCoordinator::new(&settings.coordinator));
    coordinator.clone().spawn_heartbeat(
        Duration::from_secs(settings.coordinator.heartbeat_interval_seconds),
        shutdown_token.clone(),
    );
    info!("Coordinator link configured: {}", settings.coordinator.base_url);

    // 7. 세션 컨텍스트 (reliable queue) 와 match tracker 시작
    let session = GcSession::start(coordinator, &settings.coordinator);
    let tracker_addr = spawn_match_tracker(session.clone(), settings.match_tracking.clone());

    // 8. AppState 구성
    let app_state = AppState {
        settings: settings.clone(),
        session,
        tracker_addr,
        logger_manager,
        metrics_registry,
    };

    // 9. HTTP 서버 시작
    let bind_address = format!("{}:{}", settings.server.bind_address, settings.server.port);
    info!("Starting HTTP server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        let health_route = || async { HttpResponse::Ok().body("OK") };

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .route("/metrics", web::get().to(metrics_route))
            .route("/health", web::get().to(health_route))
            .route("/ready", web::get().to(ready_route))
            .route("/debug/queue", web::get().to(queue_status_route))
            .route("/debug/match", web::get().to(match_status_route))
    })
    .bind(&bind_address)?
    .run();

    info!("GC link server is running on {}", bind_address);

    // 10. 종료 신호 대기
    tokio::select! {
        res = &mut server => {
            error!("Server exited unexpectedly");
            return res;
        },

        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received. Initiating graceful shutdown...");
            shutdown_token.cancel();
            System::current().stop();
        },
    }

    info!("Waiting for all actors to shutdown...");
    server.await?;
    info!("System has shut down gracefully");

    Ok(())
}
