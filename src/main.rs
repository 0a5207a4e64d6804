use crate::db::connection::{init_db, Database};
use crate::mailer::BrevoMailer;
use crate::notifier::Notifier;
use crate::pipeline::Pipeline;
use crate::realtime::EventPublisher;
use crate::responses::error_to_response;
use crate::router::handle;
use astra::Server;
use std::net::SocketAddr;

mod db;
mod domain;
mod errors;
mod mailer;
mod notifier;
mod pipeline;
mod probes;
mod realtime;
mod responses;
mod router;

#[cfg(test)]
mod tests;

fn main() {
    // 1️⃣ Create the database handle
    let db_path = std::env::var("CARWATCH_DB").unwrap_or_else(|_| "carwatch.sqlite3".into());
    let db = Database::new(db_path);

    // 2️⃣ Initialize database from schema.sql
    if let Err(e) = init_db(&db, "sql/schema.sql") {
        eprintln!("❌ Database initialization failed: {e}");
        std::process::exit(1);
    }

    // 3️⃣ Wire up the pipeline with its injected collaborators
    let mailer = BrevoMailer::from_env();
    if mailer.is_none() {
        eprintln!("⚠️ BREVO_API_KEY not set, notifications will be in-app only");
    }
    let publisher = EventPublisher::from_env();
    let pipeline = Pipeline::new(db, Notifier::new(mailer), publisher);

    // 4️⃣ Start the staleness reconciliation scheduler
    probes::start_scheduler(pipeline.clone());

    // 5️⃣ Start the server
    let addr: SocketAddr = std::env::var("CARWATCH_BIND")
        .unwrap_or_else(|_| "127.0.0.1:3000".into())
        .parse()
        .expect("CARWATCH_BIND must be host:port");
    println!("Starting server at http://{addr}");

    let server = Server::bind(&addr).max_workers(8);

    let result = server.serve(move |req, _info| match handle(req, &pipeline) {
        Ok(resp) => resp,
        Err(err) => error_to_response(err),
    });

    if let Err(e) = result {
        eprintln!("Server ended with error: {e}");
    }

    println!("Server shut down cleanly.");
}
