//! Basic usage example of the change engine.

use change_kit::{error::Result, source, ChangeReason, ChangeSetBuilder, Keyed};
use futures::StreamExt;
use std::time::Duration;

/// Example entity: Employment
#[derive(Clone, Debug)]
struct Employment {
    id: String,
    employer_name: String,
    salary: f64,
}

impl Keyed for Employment {
    type Key = String;

    fn key(&self) -> Self::Key {
        self.id.clone()
    }
}

fn employment(id: &str, employer_name: &str, salary: f64) -> Employment {
    Employment {
        id: id.to_string(),
        employer_name: employer_name.to_string(),
        salary,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Change Kit - Basic Example ===\n");

    // 1. Build the engine over a push source
    println!("1. Starting change engine (limit 2, expiry 200ms)...");
    let (sender, batches) = source::channel::<Employment>();
    let mut changes = ChangeSetBuilder::<String, Employment>::keyed()
        .limit_size_to(2)
        .expire_after(|_| Some(Duration::from_millis(200)))
        .observe(batches)?;
    println!("   ✓ Engine ready\n");

    // 2. First batch - everything is new
    println!("2. Loading two employments:");
    sender.send(vec![
        employment("emp_001", "Acme Corp", 75000.0),
        employment("emp_002", "Tech Inc", 95000.0),
    ])?;
    print_next(&mut changes).await?;

    // 3. Update one, add a third - the oldest is evicted
    println!("3. Raise for emp_002, hire emp_003:");
    sender.send(vec![
        employment("emp_002", "Tech Inc", 105000.0),
        employment("emp_003", "Widgets Ltd", 60000.0),
    ])?;
    print_next(&mut changes).await?;

    // 4. Wait for expiry
    println!("4. Waiting for entries to expire:");
    print_next(&mut changes).await?;

    println!("=== Example Complete ===\n");
    Ok(())
}

async fn print_next(changes: &mut change_kit::ChangeSetStream<String, Employment>) -> Result<()> {
    let Some(set) = changes.next().await else {
        println!("   Stream ended\n");
        return Ok(());
    };

    let set = set?;
    println!("   {}", set.summary());
    for change in &set {
        let marker = match change.reason {
            ChangeReason::Add => "+",
            ChangeReason::Update => "~",
            ChangeReason::Remove => "-",
            ChangeReason::Refresh => "!",
        };
        println!(
            "   {} {} at {} (${:.2})",
            marker, change.key, change.current.employer_name, change.current.salary
        );
    }
    println!();
    Ok(())
}
