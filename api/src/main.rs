mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use common::logger;
use core_logic::analyzer::AnalyzerJob;
use core_logic::anomaly::AnomalyService;
use core_logic::attendance::AttendanceService;
use core_logic::ingestion::IngestionService;
use core_logic::janitor::JanitorJob;
use core_logic::{Clock, SystemClock};
use db::repositories::{
    SeaOrmAnomalyRepository, SeaOrmAttendanceRepository, SeaOrmIdempotencyRepository,
    SeaOrmRssiStreamRepository, SeaOrmStudentRepository,
};
use util::AppConfig;

use state::AppState;

#[tokio::main]
async fn main() {
    let config = AppConfig::init();

    logger::init_logger(&config.log_level, &config.log_file);

    log::info!("starting presence-attestation api...");

    let db = db::connect_and_migrate(&config.database_url).await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let attendance_repo = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
    let students_repo = Arc::new(SeaOrmStudentRepository::new(db.clone()));
    let idempotency_repo = Arc::new(SeaOrmIdempotencyRepository::new(db.clone()));
    let streams_repo = Arc::new(SeaOrmRssiStreamRepository::new(db.clone()));
    let anomalies_repo = Arc::new(SeaOrmAnomalyRepository::new(db.clone()));

    let attendance_service = Arc::new(AttendanceService::new(
        attendance_repo.clone(),
        students_repo.clone(),
        idempotency_repo.clone(),
        clock.clone(),
    ));
    let ingestion_service = Arc::new(IngestionService::new(streams_repo.clone(), clock.clone()));
    let anomaly_service = Arc::new(AnomalyService::new(
        anomalies_repo.clone(),
        attendance_repo.clone(),
        clock.clone(),
    ));
    let analyzer = Arc::new(AnalyzerJob::new(
        streams_repo.clone(),
        attendance_repo.clone(),
        anomaly_service.clone(),
        clock.clone(),
    ));
    let janitor = Arc::new(JanitorJob::new(
        attendance_repo.clone(),
        idempotency_repo.clone(),
        clock.clone(),
        config.confirmation_window,
        config.class_duration,
        config.idempotency_retention,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let analyzer_task = tokio::spawn(analyzer.clone().run(config.analyzer_interval, shutdown_rx.clone()));
    let janitor_task = tokio::spawn(janitor.run(config.janitor_interval, shutdown_rx.clone()));

    let app_state = AppState {
        attendance: attendance_service,
        ingestion: ingestion_service,
        anomalies: anomaly_service,
        analyzer,
    };

    let app = routes::routes(app_state);

    let addr = SocketAddr::new(config.host.parse().expect("invalid HOST"), config.port);
    let listener = TcpListener::bind(addr).await.expect("failed to bind listener");

    log::info!("api listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .expect("server error");

    let _ = analyzer_task.await;
    let _ = janitor_task.await;
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    log::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
