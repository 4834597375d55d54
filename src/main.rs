mod config;
mod fetch;
mod forge;
mod governor;
mod harvest;
mod http;
mod normalize;
mod ontology;
mod orchestrate;
mod reconcile;
mod report;
mod store;

#[cfg(test)]
mod test_support;

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use fetch::{RateLimitContext, ResilientFetcher, RetryPolicy};
use forge::{GitHubClient, PrState, RepoId};
use governor::RateLimitGovernor;
use harvest::{HarvestOptions, Harvester};
use http::{CachingTransport, HttpTransport, ReqwestTransport};
use normalize::FormatNormalizer;
use ontology::RunoakAdapter;
use orchestrate::{AnalyzeOptions, DiffOrchestrator};
use store::YamlStore;

const RAW_STORE: &str = "raw_data.yaml";
const FINAL_STORE: &str = "data_with_changes.yaml";
const TMP_DIR: &str = "tmp";

/// Ontodiff Curator: pairs merged ontology pull requests and the issues they
/// close with the change operations each pull request made to the ontology.
#[derive(Parser, Debug)]
#[command(name = "ontodiff-curator", version, about)]
struct Cli {
    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and skip the run summary
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (default: .ontodiff-curator.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest merged pull requests and their closed issues
    Scrape(ScrapeArgs),
    /// Diff each harvested pull request's ontology revisions
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct RepoArgs {
    /// Repository as org/name or a github.com URL
    #[arg(short, long)]
    repo: String,

    /// GitHub token (falls back to the config file, then GITHUB_TOKEN)
    #[arg(short = 'g', long)]
    token: Option<String>,

    /// Store to write
    #[arg(short, long = "output-file")]
    output: Option<PathBuf>,

    /// Append to an existing store instead of truncating it
    #[arg(long = "no-overwrite", action = ArgAction::SetFalse)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Highest PR number to harvest
    #[arg(long)]
    max_pr_number: Option<u64>,

    /// Lowest PR number to harvest
    #[arg(long)]
    min_pr_number: Option<u64>,

    /// Which pull requests to list
    #[arg(long, value_enum, default_value_t = PrState::Closed)]
    state: PrState,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Harvested store to read
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Skip pull requests numbered below this
    #[arg(long)]
    resume_from: Option<u64>,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, _) => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    debug!(data_dir = %config.paths.data_dir.display(), "configuration loaded");

    let inner = ReqwestTransport::new(config.fetch.timeout())?;
    let transport: Arc<dyn HttpTransport> = Arc::new(CachingTransport::new(
        inner,
        config.cache.max_entries,
        config.cache.max_body_bytes,
    ));

    match cli.command {
        Command::Scrape(args) => scrape(&config, transport, args, cli.quiet).await,
        Command::Analyze(args) => analyze(&config, transport, args, cli.quiet).await,
    }
}

/// `data_dir/<org>_<name>`
fn repo_dir(config: &Config, repo: &RepoId) -> PathBuf {
    config.paths.data_dir.join(repo.dir_name())
}

fn client(config: &Config, transport: Arc<dyn HttpTransport>, repo: &RepoId, args: &RepoArgs) -> GitHubClient {
    let client = GitHubClient::new(
        transport,
        &config.github.api_url,
        repo.clone(),
        config.github_token(args.token.as_deref()),
    );
    if !client.is_authenticated() {
        warn!("no GitHub token configured, unauthenticated rate limits apply");
    }
    client
}

async fn scrape(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
    args: ScrapeArgs,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = forge::parse_repo(&args.repo.repo)?;
    let output = args
        .repo
        .output
        .clone()
        .unwrap_or_else(|| repo_dir(config, &repo).join(RAW_STORE));
    let forge = client(config, transport, &repo, &args.repo);
    let governor = RateLimitGovernor::new(config.pacing.clone());

    let options = HarvestOptions {
        resource: config.resource_for(&repo.to_string()),
        repo,
        state: args.state,
        min_number: args.min_pr_number,
        max_number: args.max_pr_number,
        raw_url: config.github.raw_url.clone(),
    };
    let store = YamlStore::create(&output, args.repo.overwrite)?;
    info!(output = %output.display(), overwrite = args.repo.overwrite, "scraping");

    let summary = Harvester::new(&forge, &governor, options).run(&store).await?;
    if !quiet {
        report::print_summary(&summary, store.path())?;
    }
    Ok(())
}

async fn analyze(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
    args: AnalyzeArgs,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = forge::parse_repo(&args.repo.repo)?;
    let dir = repo_dir(config, &repo);
    let input = args.input.clone().unwrap_or_else(|| dir.join(RAW_STORE));
    let output = args
        .repo
        .output
        .clone()
        .unwrap_or_else(|| dir.join(FINAL_STORE));
    let tmp_dir = scratch_dir(config, &repo);

    let forge = client(config, transport.clone(), &repo, &args.repo);
    let governor = RateLimitGovernor::new(config.pacing.clone());
    let fetcher = ResilientFetcher::new(
        transport,
        RetryPolicy {
            delay: config.fetch.retry_delay(),
            max_attempts: config.fetch.max_attempts,
        },
    );
    let normalizer = FormatNormalizer::new(config.tools.robot.clone(), config.tools.catalog.clone());
    let adapter = RunoakAdapter::new(config.tools.runoak.clone());

    let options = AnalyzeOptions {
        repo,
        input,
        output: output.clone(),
        tmp_dir,
        resume_from: args.resume_from,
        overwrite: args.repo.overwrite,
        file_selection: config.analyze.file_selection,
        write_empty: config.analyze.write_empty,
        drop_junk_lines: config.analyze.drop_junk_lines,
    };
    info!(output = %output.display(), overwrite = options.overwrite, "analyzing");

    let summary = DiffOrchestrator::new(&fetcher, &normalizer, &adapter, options)
        .with_rate_limit(RateLimitContext {
            governor: &governor,
            forge: &forge,
        })
        .run()
        .await?;
    if !quiet {
        report::print_summary(&summary, &output)?;
    }
    Ok(())
}

/// Temporary revisions live in the repository's own directory, wherever the
/// store is written.
fn scratch_dir(config: &Config, repo: &RepoId) -> PathBuf {
    repo_dir(config, repo).join(TMP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["ontodiff-curator", "scrape", "-r", "geneontology/go-ontology"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        match cli.command {
            Command::Scrape(args) => {
                assert!(args.repo.overwrite);
                assert_eq!(args.state, PrState::Closed);
                assert!(args.min_pr_number.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cli_analyze_flags() {
        let cli = Cli::try_parse_from([
            "ontodiff-curator",
            "analyze",
            "-vv",
            "--repo",
            "obophenotype/uberon",
            "-g",
            "ghp_x",
            "-o",
            "out/final.yaml",
            "--resume-from",
            "3000",
            "--no-overwrite",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Analyze(args) => {
                assert!(!args.repo.overwrite);
                assert_eq!(args.repo.token.as_deref(), Some("ghp_x"));
                assert_eq!(args.resume_from, Some(3000));
                assert_eq!(args.repo.output, Some(PathBuf::from("out/final.yaml")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cli_state_values() {
        let cli = Cli::try_parse_from(["ontodiff-curator", "scrape", "-r", "o/r", "--state", "merged"]).unwrap();
        assert!(matches!(cli.command, Command::Scrape(ScrapeArgs { state: PrState::Merged, .. })));
        assert!(Cli::try_parse_from(["ontodiff-curator", "scrape", "-r", "o/r", "--state", "draft"]).is_err());
    }

    #[test]
    fn test_default_store_layout() {
        let config = Config::default();
        let repo = forge::parse_repo("geneontology/go-ontology").unwrap();
        let dir = repo_dir(&config, &repo);
        assert_eq!(dir.join(RAW_STORE), PathBuf::from("./geneontology_go-ontology/raw_data.yaml"));
        assert_eq!(scratch_dir(&config, &repo), PathBuf::from("./geneontology_go-ontology/tmp"));
    }

    #[test]
    fn test_scratch_dir_ignores_output_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().join("data");
        let neighbour = dir.path().join("tmp");
        std::fs::create_dir_all(&neighbour).unwrap();
        std::fs::write(neighbour.join("notes.txt"), "keep me").unwrap();

        // store written to dir/out.yaml must not claim dir/tmp
        let repo = forge::parse_repo("obophenotype/uberon").unwrap();
        let scratch = scratch_dir(&config, &repo);
        let workspace = orchestrate::TempWorkspace::new(&scratch).unwrap();
        assert_eq!(workspace.dir(), dir.path().join("data/obophenotype_uberon/tmp"));
        assert_eq!(std::fs::read_to_string(neighbour.join("notes.txt")).unwrap(), "keep me");
    }
}
