use migration::runner;
use std::env;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    runner::run_all_migrations(&url).await;
}
