use clap::{Arg, Command};
use log::LevelFilter;
use phish_detector::{Config, Detector, EngineContext, PredictionResult};
use std::process;
use std::sync::Arc;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() {
    let matches = Command::new("phish-detector")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classify URLs as phishing or legitimate")
        .long_about(
            "Extracts lexical, DNS, WHOIS and page-content features from each URL,\n\
             scores them with a trained soft-voting ensemble and applies heuristic\n\
             overrides to produce a Phishing, Suspicious or Legitimate verdict.",
        )
        .arg(
            Arg::new("urls")
                .value_name("URL")
                .help("URLs to classify")
                .num_args(0..)
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("phish-detector.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and model artifacts, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("model-info")
                .long("model-info")
                .help("Show the loaded model's schema and evaluation figures")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print one JSON result per line")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("phish-detector.yaml");

    let config = match Config::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {e:#}");
        process::exit(1);
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    let detector = match Detector::from_config(&config) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            eprintln!("Error initializing detector: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("model-info") {
        print_model_info(detector.context());
        return;
    }

    let urls: Vec<String> = matches
        .get_many::<String>("urls")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if urls.is_empty() {
        eprintln!("No URLs given. Run with --help for usage.");
        process::exit(2);
    }

    let json = matches.get_flag("json");
    let mut tasks = JoinSet::new();
    for (index, url) in urls.into_iter().enumerate() {
        let detector = Arc::clone(&detector);
        tasks.spawn(async move {
            let outcome = detector.predict(&url).await;
            (index, url, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("Prediction task failed: {e}"),
        }
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut failures = 0;
    for (_, url, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                if json {
                    match serde_json::to_string(&result) {
                        Ok(line) => println!("{line}"),
                        Err(e) => {
                            log::error!("Failed to serialize result for {url}: {e}");
                            failures += 1;
                        }
                    }
                } else {
                    print_result(&result);
                }
            }
            Err(e) => {
                log::debug!("Prediction for {url} failed: {e}");
                failures += 1;
                if json {
                    println!("{}", serde_json::json!({ "url": url, "error": e.user_message() }));
                } else {
                    eprintln!("{url}: {}", e.user_message());
                }
            }
        }
    }

    if failures > 0 {
        process::exit(1);
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Schema:      {}", config.model.schema_path);
    println!("Classifier:  {}", config.model.classifier_path);
    println!(
        "Scaler:      {}",
        config.model.scaler_path.as_deref().unwrap_or("(none)")
    );
    println!(
        "WHOIS:       {}",
        if config.whois.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "Search probe: {}",
        if config.search_probe.enabled {
            config.search_probe.endpoint.as_str()
        } else {
            "disabled"
        }
    );

    match EngineContext::load(&config.model, &config.decision) {
        Ok(context) => {
            println!(
                "Model artifacts loaded: schema v{} with {} features",
                context.schema.version,
                context.schema.len()
            );
            println!("Override rules: {}", context.decision.rule_names().join(", "));
            println!("✅ Configuration is valid");
        }
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    }
}

fn print_model_info(context: &EngineContext) {
    println!("Schema version: {}", context.schema.version);
    println!("Features ({}):", context.schema.len());
    for (i, name) in context.schema.features.iter().enumerate() {
        println!("  {:>2}. {name}", i + 1);
    }
    println!(
        "Scaler: {}",
        if context.scaler.is_some() { "standard" } else { "none" }
    );

    match context.info() {
        Some(info) => {
            if let Some(acc) = info.val_accuracy {
                println!("Validation accuracy: {:.2}%", acc * 100.0);
            }
            if let Some(acc) = info.test_accuracy {
                println!("Test accuracy: {:.2}%", acc * 100.0);
            }
            if let Some(matrix) = &info.confusion_matrix {
                println!("Confusion matrix:");
                for row in matrix {
                    let cells: Vec<String> = row.iter().map(|c| format!("{c:>6}")).collect();
                    println!("  {}", cells.join(" "));
                }
            }
        }
        None => println!("No evaluation figures recorded for this model"),
    }
}

fn print_result(result: &PredictionResult) {
    let marker = match result.result {
        phish_detector::Label::Phishing => "⚠️",
        phish_detector::Label::Suspicious => "❓",
        phish_detector::Label::Legitimate => "✅",
    };
    println!("{marker} {} => {} ({:.2})", result.url, result.result, result.probability);
    if let Some(rule) = result.rule {
        println!("   override: {rule}");
    }

    let info = &result.domain_info;
    println!(
        "   dns: {}  indexed: {}  domain age: {}  registration length: {}",
        if info.dns_resolves { "yes" } else { "no" },
        if info.search_indexed { "yes" } else { "no" },
        info.domain_age_days,
        info.registration_length_days
    );

    let page = &result.html_analysis;
    if !page.title.is_empty() {
        println!("   title: {}", truncate_string(&page.title, 80));
    }
    println!(
        "   links: {}  forms: {}  iframes: {}",
        page.link_count, page.form_count, page.iframe_count
    );
    for link in &page.external_links {
        println!("   → {}", truncate_string(link, 100));
    }

    log::debug!(
        "Features for {}: {}",
        result.url,
        result
            .features
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    );
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
