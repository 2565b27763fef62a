//! # Migrating a workflow database
//!
//! Seeds an in-memory database in the version 1 layout, then moves it to the
//! version given on the command line (`latest` when omitted).
//!
//! ```text
//! RUST_LOG=info cargo run -p stratum --example migrate --features in-memory -- latest
//! RUST_LOG=info cargo run -p stratum --example migrate --features in-memory -- 0 --force
//! ```

use stratum::mem::InMemoryConnection;
use stratum::prelude::*;
use stratum::workflow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let target: Target = std::env::args()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .as_deref()
        .unwrap_or("latest")
        .parse()?;
    let force = std::env::args().any(|arg| arg == "--force");

    let mut conn = InMemoryConnection::new();
    let mut migrator = Migrator::new(workflow::registry()?);

    // A dashboard database as version 1 left it.
    migrator
        .migrate(&mut conn, Target::Version(SchemaVersion::new(1)), false)
        .await?;
    conn.insert_row("workflow", [("wf_id", "1"), ("wf_uuid", "a1b2c3d4")])?;

    println!("Before:");
    for status in migrator.status(&mut conn).await? {
        println!(
            "  v{} {:<16} applied={:<5} shape={:?}",
            status.version,
            status.name,
            status.applied.is_some(),
            status.shape
        );
    }

    match migrator.migrate(&mut conn, target, force).await {
        Ok(report) if report.is_noop() => println!("Nothing to do at version {}", report.to),
        Ok(report) => {
            println!("Migrated {} -> {}:", report.from, report.to);
            for step in &report.steps {
                let skipped = if step.skipped { " (skipped)" } else { "" };
                println!("  {} {} {}{skipped}", step.direction, step.version, step.name);
            }
        }
        Err(e) => {
            eprintln!("Migration failed: {e}");
            eprintln!("Migrator state: {}", migrator.state());
            return Err(e.into());
        }
    }

    println!("Tables:");
    for (table, columns) in conn.schema() {
        println!("  {table}: {}", columns.join(", "));
    }
    Ok(())
}
