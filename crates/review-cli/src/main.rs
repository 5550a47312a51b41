use std::collections::HashMap;
use std::process::exit;
use std::sync::Arc;

use review_core::{ActionRef, ConcurrencyController, Invocation, LogNotifier, OutboxDispatcher, ReviewError,
                  TransitionEngine, WriteOutcome};
use review_domain::HistoryKind;
use review_persistence::{PgReviewStore, PoolProvider};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type Store = PgReviewStore<PoolProvider>;

const USAGE: &str = "\
Uso: review-cli <comando> [opciones]
  execute    --app <UUID> --action <UUID> [--source workflow_action|stage_action] [--actor <ID>] [--comment <TXT>]
  status     --app <UUID> --stage <UUID> --label <TXT> [--actor <ID>] [--comment <TXT>]
  move-group --app <UUID> --group <UUID> [--actor <ID>] [--comment <TXT>]
  restore    --app <UUID> (--stage <UUID> | --version <N>) [--actor <ID>]
  autosave   --app <UUID> --version <N> --changes '<JSON>' [--actor <ID>]
  submit     --app <UUID> [--actor <ID>]
  history    --app <UUID> [--kind action|stage|move|review]
  drain      [--limit <N>]";

fn usage() -> ! {
    eprintln!("{USAGE}");
    exit(2);
}

/// `--clave valor` a partir de `args[2..]`; una clave sin valor termina en uso.
fn parse_flags(args: &[String]) -> HashMap<String, String> {
    let mut flags = HashMap::new();
    let mut i = 0;
    while i < args.len() {
        let Some(key) = args[i].strip_prefix("--") else {
            eprintln!("[review] argumento inesperado: {}", args[i]);
            usage();
        };
        i += 1;
        let Some(value) = args.get(i) else {
            eprintln!("[review] falta valor para --{key}");
            usage();
        };
        flags.insert(key.to_string(), value.clone());
        i += 1;
    }
    flags
}

fn uuid_flag(flags: &HashMap<String, String>, key: &str) -> Option<Uuid> {
    flags.get(key).and_then(|v| Uuid::parse_str(v).ok())
}

fn required_uuid(flags: &HashMap<String, String>, key: &str) -> Uuid {
    match uuid_flag(flags, key) {
        Some(id) => id,
        None => {
            eprintln!("[review] --{key} <UUID> es obligatorio");
            usage();
        }
    }
}

fn exit_code(e: &ReviewError) -> i32 {
    match e {
        ReviewError::Internal(_) => 5,
        _ => 4,
    }
}

fn report<T: Serialize>(cmd: &str, result: Result<T, ReviewError>) -> ! {
    match result {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("[review {cmd}] no se pudo serializar la respuesta: {e}");
                    exit(5);
                }
            }
            exit(0);
        }
        Err(e) => {
            eprintln!("[review {cmd}] {e}");
            exit(exit_code(&e));
        }
    }
}

fn open_store() -> Arc<Store> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[review] requiere DATABASE_URL para operar contra backend persistente");
        exit(4);
    }
    match review_persistence::build_dev_pool_from_env() {
        Ok(pool) => Arc::new(PgReviewStore::new(PoolProvider { pool })),
        Err(e) => {
            eprintln!("[review] pool error: {e}");
            exit(5);
        }
    }
}

fn invocation<'a>(flags: &'a HashMap<String, String>) -> Invocation<'a> {
    let mut inv = Invocation::default();
    if let Some(actor) = flags.get("actor") {
        inv = Invocation::by(actor);
    }
    if let Some(comment) = flags.get("comment") {
        inv = inv.with_comment(comment);
    }
    inv
}

fn main() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter)
                             .with_writer(std::io::stderr)
                             .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }
    let cmd = args[1].as_str();
    let flags = parse_flags(&args[2..]);
    let actor = flags.get("actor").map(String::as_str);

    match cmd {
        "execute" => {
            let app = required_uuid(&flags, "app");
            let action = required_uuid(&flags, "action");
            let source = flags.get("source").map(String::as_str).unwrap_or("workflow_action");
            let action_ref = match ActionRef::parse(source, action) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("[review execute] {e}");
                    exit(2);
                }
            };
            let store = open_store();
            let engine = TransitionEngine::new(store.clone(), store);
            report(cmd, engine.execute(&action_ref, app, invocation(&flags)));
        }
        "status" => {
            let app = required_uuid(&flags, "app");
            let stage = required_uuid(&flags, "stage");
            let Some(label) = flags.get("label") else { usage() };
            let store = open_store();
            let engine = TransitionEngine::new(store.clone(), store);
            report(cmd, engine.execute_status_action(stage, label, app, invocation(&flags)));
        }
        "move-group" => {
            let app = required_uuid(&flags, "app");
            let group = required_uuid(&flags, "group");
            let store = open_store();
            let engine = TransitionEngine::new(store.clone(), store);
            report(cmd, engine.move_to_group(app, group, invocation(&flags)));
        }
        "restore" => {
            let app = required_uuid(&flags, "app");
            let store = open_store();
            if let Some(stage) = uuid_flag(&flags, "stage") {
                let engine = TransitionEngine::new(store.clone(), store);
                report(cmd, engine.restore_from_group(app, stage, invocation(&flags)));
            }
            let Some(version) = flags.get("version").and_then(|v| v.parse::<i64>().ok()) else { usage() };
            let versions = ConcurrencyController::new(store.clone(), store);
            report(cmd, versions.restore(app, version, actor));
        }
        "autosave" => {
            let app = required_uuid(&flags, "app");
            let Some(base) = flags.get("version").and_then(|v| v.parse::<i64>().ok()) else { usage() };
            let Some(raw) = flags.get("changes") else { usage() };
            let changes: Map<String, Value> = match serde_json::from_str(raw) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("[review autosave] changes JSON parse error: {e}");
                    exit(3);
                }
            };
            let store = open_store();
            let versions = ConcurrencyController::new(store.clone(), store);
            match versions.autosave(app, base, changes, actor) {
                Ok(WriteOutcome::Applied(receipt)) => report(cmd, Ok(receipt)),
                Ok(WriteOutcome::Conflict(c)) => {
                    eprintln!("[review autosave] conflicto: versión del servidor {}", c.server_version);
                    println!("{}", Value::Object(c.server_data));
                    exit(4);
                }
                Err(e) => report::<()>(cmd, Err(e)),
            }
        }
        "submit" => {
            let app = required_uuid(&flags, "app");
            let store = open_store();
            let versions = ConcurrencyController::new(store.clone(), store);
            report(cmd, versions.submit(app, actor));
        }
        "history" => {
            let app = required_uuid(&flags, "app");
            let kind = match flags.get("kind").map(|k| k.parse::<HistoryKind>()) {
                None => HistoryKind::Action,
                Some(Ok(k)) => k,
                Some(Err(e)) => {
                    eprintln!("[review history] {e}");
                    exit(2);
                }
            };
            let store = open_store();
            let engine = TransitionEngine::new(store.clone(), store);
            report(cmd, engine.history(app, kind));
        }
        "drain" => {
            let limit = flags.get("limit").and_then(|v| v.parse::<usize>().ok()).unwrap_or(100);
            let store = open_store();
            let dispatcher = OutboxDispatcher::new(store, LogNotifier);
            report(cmd, dispatcher.drain(limit));
        }
        _ => usage(),
    }
}
