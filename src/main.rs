use anyhow::Context as _;
use cfn_reactor::path::PathExpr;
use cfn_reactor::{
    Action, Dialect, EntityId, FacetId, IntegrationId, RuleCatalog, Session, SessionConfig,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "cfn-reactor")]
#[command(about = "Apply reaction rules to a CloudFormation-style template", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a list of actions against a template.
    Apply {
        #[arg(long)]
        template: PathBuf,

        #[arg(long)]
        rules: PathBuf,

        /// JSON list of {"Apply": {"Entity", "Action"}} / {"Remove": {"Entity"}} steps.
        #[arg(long)]
        actions: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the dialect from --config.
        #[arg(long)]
        dialect: Option<Dialect>,

        #[arg(short = 'o', long)]
        out: Option<PathBuf>,
    },
    /// Print every node a path expression matches.
    Query {
        #[arg(long)]
        template: PathBuf,

        #[arg(long)]
        path: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
enum Step {
    Apply {
        #[serde(rename = "Entity")]
        entity: RawEntity,
        #[serde(rename = "Action")]
        action: Action,
    },
    Remove {
        #[serde(rename = "Entity")]
        entity: RawEntity,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
enum RawEntity {
    Resource(String),
    Facet(RawFacet),
    Integration {
        #[serde(rename = "Source")]
        source: String,
        #[serde(rename = "Target")]
        target: String,
        #[serde(rename = "Facet", default)]
        facet: Option<RawFacet>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RawFacet {
    resource: String,
    r#type: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl RawFacet {
    fn id(&self) -> FacetId {
        FacetId::derive(&self.resource, &self.r#type, &self.properties)
    }
}

impl RawEntity {
    fn id(&self) -> EntityId {
        match self {
            RawEntity::Resource(r) => EntityId::resource(r),
            RawEntity::Facet(f) => EntityId::Facet(f.id()),
            RawEntity::Integration {
                source,
                target,
                facet,
            } => EntityId::Integration(IntegrationId::derive(
                source,
                target,
                facet.as_ref().map(RawFacet::id),
            )),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {} {}", what, path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {} {}", what, path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Apply {
            template,
            rules,
            actions,
            config,
            dialect,
            out,
        } => {
            // 1) Inputs: config (optional), catalog, document, steps.
            let mut cfg = match &config {
                Some(p) => SessionConfig::load(p)
                    .with_context(|| format!("loading config {}", p.display()))?,
                None => SessionConfig::default(),
            };
            if let Some(d) = dialect {
                cfg.dialect = d;
            }
            let catalog = RuleCatalog::load(&rules)
                .with_context(|| format!("loading rules {}", rules.display()))?;
            let document: Value = read_json(&template, "template")?;
            let steps: Vec<Step> = read_json(&actions, "actions")?;

            // 2) Replay.
            let mut session = Session::new(document, catalog, cfg);
            for (i, step) in steps.iter().enumerate() {
                match step {
                    Step::Apply { entity, action } => {
                        session
                            .apply(action, &entity.id())
                            .with_context(|| format!("step {} ({:?})", i, action.kind))?;
                    }
                    Step::Remove { entity } => {
                        session
                            .remove_entity(&entity.id())
                            .with_context(|| format!("step {} (remove {})", i, entity.id()))?;
                    }
                }
            }

            // 3) Output.
            let text = serde_json::to_string_pretty(session.document())?;
            match out {
                Some(out) => {
                    std::fs::write(&out, text)
                        .with_context(|| format!("writing {}", out.display()))?;
                    eprintln!("Wrote {}", out.display());
                }
                None => println!("{}", text),
            }
        }
        Commands::Query { template, path } => {
            let document: Value = read_json(&template, "template")?;
            let expr = PathExpr::parse(&path)?;
            for m in expr.find(&document, None)? {
                println!("{}\t{}", m.path, m.value);
            }
        }
    }

    Ok(())
}
