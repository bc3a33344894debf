/// Page Expansion Tracer - Shows the flow through Wikitext → Nodes → Tokens
///
/// Usage: cargo run --bin trace_expand <page-file> [rules.toml] [templates-dir]
///
/// Template bodies are read from `<templates-dir>/<name>.wiki`.
use glossa_core::{Force, GlossaResult, Params};
use glossa_wikitext::{parse, Engine, EngineConfig, PageOutcome, Rules, TemplateResolver};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Reads template bodies from a directory on demand.
struct DirResolver {
    dir: Option<PathBuf>,
}

impl TemplateResolver for DirResolver {
    fn resolve(&self, name: &str, _force: Force) -> GlossaResult<Option<String>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        Ok(fs::read_to_string(dir.join(format!("{}.wiki", name))).ok())
    }

    fn names(&self) -> GlossaResult<Vec<String>> {
        let Some(entries) = self.dir.as_ref().and_then(|dir| fs::read_dir(dir).ok()) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                match path.extension() {
                    Some(ext) if ext == "wiki" => path.file_stem()?.to_str().map(str::to_string),
                    _ => None,
                }
            })
            .collect())
    }
}

fn load_rules(path: Option<&String>) -> GlossaResult<Rules> {
    let config = match path {
        Some(path) => EngineConfig::from_file(Path::new(path))?,
        None => EngineConfig::from_toml_str(include_str!("../../rules/ru.toml"))?,
    };
    Rules::compile(&config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin trace_expand <page-file> [rules.toml] [templates-dir]");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin trace_expand pages/кошка.wiki rules/ru.toml templates/");
        std::process::exit(1);
    }

    let page_path = &args[1];

    println!("╔═══════════════════════════════════════════════════════════════");
    println!("║ PAGE EXPANSION TRACER");
    println!("╚═══════════════════════════════════════════════════════════════\n");

    let content = match fs::read_to_string(page_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {}", page_path, e);
            std::process::exit(1);
        }
    };
    let title = Path::new(page_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rules = match load_rules(args.get(2)) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("❌ Failed to load rules: {}", e);
            std::process::exit(1);
        }
    };
    let resolver = DirResolver {
        dir: args.get(3).map(PathBuf::from),
    };
    let engine = Engine::new(Arc::new(rules), resolver);

    println!("📝 INPUT ({}):", title);
    println!("{}", content);
    println!();

    println!("🌳 NODE TREE:");
    println!("─────────────────────────────────────────────────────────────");
    for node in parse(&content) {
        println!("{:?}", node);
    }
    println!();

    println!("🔧 EXPANDED TEXT:");
    println!("─────────────────────────────────────────────────────────────");
    match engine.expand_text(&title, &content, Params::new(), Force::UseCache) {
        Ok(expanded) => println!("{}", expanded.text),
        Err(e) => println!("❌ {}", e),
    }
    println!();

    println!("🎯 TOKENS:");
    println!("─────────────────────────────────────────────────────────────");
    if !engine.is_valid_page(&content) {
        println!("(page does not qualify for parsing)");
        return;
    }
    match engine.parse_page(&title, &content, Force::UseCache) {
        Ok(PageOutcome::Skipped) => println!("(page skipped)"),
        Ok(PageOutcome::Parsed { tokens, warnings }) => {
            let by_name: BTreeMap<&str, usize> = tokens.iter().fold(BTreeMap::new(), |mut acc, t| {
                *acc.entry(t.name.as_str()).or_insert(0) += 1;
                acc
            });
            for token in &tokens {
                match serde_json::to_string(token) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("❌ {}", e),
                }
            }
            println!();
            println!("📊 {} tokens: {:?}", tokens.len(), by_name);
            if !warnings.is_empty() {
                println!();
                println!("⚠️  WARNINGS:");
                for warning in warnings {
                    println!("  {}", warning);
                }
            }
        }
        Err(e) => {
            println!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
