use super::*;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["adharvest-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli =
        Cli::try_parse_from(["adharvest-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["adharvest-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn collect_direct_defaults_to_manual_ads() {
    let id = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from([
        "adharvest-cli",
        "collect",
        "direct",
        "--integration",
        &id,
        "--start",
        "2024-01-01",
        "--end",
        "2024-01-31",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Collect {
            command: CollectCommands::Direct {
                mode: CollectionMode::Manual,
                collection_type: CollectionType::Ads,
                ..
            }
        })
    ));
}

#[test]
fn collect_direct_accepts_mode_and_type() {
    let id = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from([
        "adharvest-cli",
        "collect",
        "direct",
        "--integration",
        &id,
        "--start",
        "2024-01-01",
        "--end",
        "2024-01-01",
        "--mode",
        "daily",
        "--type",
        "demographics",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Collect {
            command: CollectCommands::Direct {
                mode: CollectionMode::Daily,
                collection_type: CollectionType::Demographics,
                ..
            }
        })
    ));
}

#[test]
fn collect_direct_rejects_unknown_type() {
    let id = Uuid::new_v4().to_string();
    let result = Cli::try_parse_from([
        "adharvest-cli",
        "collect",
        "direct",
        "--integration",
        &id,
        "--start",
        "2024-01-01",
        "--end",
        "2024-01-01",
        "--type",
        "keywords",
    ]);
    assert!(result.is_err());
}

#[test]
fn collect_initial_parses_dates() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from([
        "adharvest-cli",
        "collect",
        "initial",
        "--integration",
        &id.to_string(),
        "--start",
        "2023-01-01",
        "--end",
        "2023-12-31",
    ])
    .unwrap();

    assert!(matches!(
        cli.command,
        Some(Commands::Collect {
            command: CollectCommands::Initial { integration, start, .. }
        }) if integration == id && start == NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    ));
}

#[test]
fn collect_initial_rejects_malformed_date() {
    let id = Uuid::new_v4().to_string();
    let result = Cli::try_parse_from([
        "adharvest-cli",
        "collect",
        "initial",
        "--integration",
        &id,
        "--start",
        "01/01/2023",
        "--end",
        "2023-12-31",
    ]);
    assert!(result.is_err());
}

#[test]
fn worker_run_once_defaults_to_single_batch() {
    let cli = Cli::try_parse_from(["adharvest-cli", "worker", "run-once"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Worker {
            command: WorkerCommands::RunOnce { drain: false }
        })
    ));
}

#[test]
fn worker_run_once_with_drain() {
    let cli = Cli::try_parse_from(["adharvest-cli", "worker", "run-once", "--drain"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Worker {
            command: WorkerCommands::RunOnce { drain: true }
        })
    ));
}

#[test]
fn resolve_token_requires_integration() {
    assert!(Cli::try_parse_from(["adharvest-cli", "resolve-token"]).is_err());
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from([
        "adharvest-cli",
        "resolve-token",
        "--integration",
        &id.to_string(),
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::ResolveToken { integration }) if integration == id
    ));
}
