//! # Tree Search Runner
//!
//! Grows a search tree over the balancing walker and prints what each stage
//! produced. Stages can be chained: every stage after the first runs on the
//! first node the previous one returned.
//!
//! ## Usage
//! Run with `cargo run --release -- --sampler ucb --stage max-depth --depth 6 --chain 3`.
//! Set `RUST_LOG=treesearch=debug` to follow workers and stages.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use treesearch::envs::walker::{Push, WalkerSim, WalkerState};
use treesearch::filter::{Downsample, NodeFilter};
use treesearch::sampler::{
    DeterministicSampler, DistributionSampler, EndScore, GreedySampler, RandomSampler, Sampler, UcbSampler,
};
use treesearch::stage::{FixedGames, MaxDepth, MinDepth, SearchForever, TreeStage};
use treesearch::value::Average;
use treesearch::{NodeId, Search, SearchConfig, SearchError, SearchTree};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SamplerKind {
    Ucb,
    Random,
    Distribution,
    Greedy,
    Deterministic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageKind {
    Fixed,
    MaxDepth,
    MinDepth,
    Forever,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of search workers (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = SamplerKind::Ucb)]
    sampler: SamplerKind,

    #[arg(long, value_enum, default_value_t = StageKind::Fixed)]
    stage: StageKind,

    /// Games per stage for `fixed`, game cap for `max-depth`
    #[arg(short, long, default_value_t = 10_000)]
    games: u64,

    /// Relative depth for the depth stages
    #[arg(short, long, default_value_t = 5)]
    depth: u32,

    /// Number of stages to run back to back
    #[arg(long, default_value_t = 1)]
    chain: usize,

    /// Keep at most this many results per stage
    #[arg(long)]
    downsample: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short = 'e', long, default_value_t = std::f64::consts::SQRT_2)]
    exploration: f64,

    #[arg(long, default_value_t = 10)]
    rollout_steps: u32,

    /// Longest push or coast, in ticks
    #[arg(long, default_value_t = 4)]
    max_duration: u32,

    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

fn build_config(args: &Args) -> SearchConfig {
    let mut config = SearchConfig::default()
        .with_poll_interval(Duration::from_millis(args.poll_ms))
        .with_exploration_constant(args.exploration)
        .with_rollout_steps(args.rollout_steps);
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    config
}

fn build_sampler(kind: SamplerKind, config: &SearchConfig) -> Box<dyn Sampler<Push, WalkerState>> {
    let eval = WalkerSim::evaluation();
    let backoff = config.backoff.clone();
    match kind {
        SamplerKind::Ucb => {
            let rollout = Arc::new(EndScore::new(eval.clone(), config.rollout.clone()));
            Box::new(UcbSampler::new(config.ucb.clone(), eval, rollout, Arc::new(Average)).with_backoff(backoff))
        }
        SamplerKind::Random => Box::new(RandomSampler::new(eval).with_backoff(backoff)),
        SamplerKind::Distribution => Box::new(DistributionSampler::new(eval).with_backoff(backoff)),
        SamplerKind::Greedy => Box::new(GreedySampler::new(config.greedy.clone(), eval).with_backoff(backoff)),
        SamplerKind::Deterministic => Box::new(
            DeterministicSampler::new()
                .with_evaluation(eval)
                .with_backoff(backoff),
        ),
    }
}

fn build_stage(args: &Args) -> Box<dyn TreeStage<Push, WalkerState>> {
    match args.stage {
        StageKind::Fixed => Box::new(FixedGames::new(args.games)),
        StageKind::MaxDepth => Box::new(MaxDepth::new(args.depth, args.games)),
        StageKind::MinDepth => Box::new(MinDepth::new(args.depth)),
        StageKind::Forever => Box::new(SearchForever),
    }
}

fn describe(tree: &SearchTree<Push, WalkerState>, id: NodeId) -> String {
    let node = tree.node(id);
    let value = node.value();
    let path = tree
        .path_actions(id)
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} depth {} value {:.3} ({} updates) x={:.3} [{}]",
        id,
        node.depth(),
        value.value(),
        value.update_count(),
        node.state().position,
        path
    )
}

fn run(args: Args) -> Result<(), SearchError> {
    let config = build_config(&args);
    let sampler = build_sampler(args.sampler, &config);
    let tree = SearchTree::new(
        WalkerState::initial(),
        Arc::new(WalkerSim::action_generator(args.max_duration)),
    );

    println!("{}", "Parallel Tree Search".bold());
    println!("====================");
    println!("Workers: {}", config.worker_count);
    println!("Sampler: {:?}", args.sampler);
    println!("Stage: {:?} x {}", args.stage, args.chain);
    println!("--------------------");

    let mut search = Search::with_sampler(config, tree, sampler, Box::new(WalkerSim::default()))?;
    let downsample = args.downsample.map(Downsample::evenly);
    let mut root = search.tree().root();
    let started = Instant::now();

    for round in 0..args.chain.max(1) {
        let mut stage = build_stage(&args);
        let mut results = search.run_stage(stage.as_mut(), root)?;
        if let Some(filter) = &downsample {
            results = filter.filter(search.tree(), results);
        }

        println!("{} {} -> {} result(s)", "Stage".cyan(), round + 1, results.len());
        for &id in results.iter().take(10) {
            println!("  {}", describe(search.tree(), id));
        }
        match results.first() {
            Some(&next) => root = next,
            None => {
                println!("{}", "Stage produced no nodes; stopping the chain".yellow());
                break;
            }
        }
        if search.tree().is_fully_explored(root) {
            println!("{}", "Next root is fully explored; stopping the chain".yellow());
            break;
        }
    }

    print_stats(&search, started.elapsed());
    Ok(())
}

fn print_stats(search: &Search<Push, WalkerState>, duration: Duration) {
    let stats = search.statistics();
    let secs = duration.as_secs_f64().max(f64::EPSILON);

    println!("{}", "Results:".green().bold());
    println!("  Total Nodes: {}", stats.total_nodes);
    println!("  Games: {}", stats.iterations);
    println!("  Simulator Steps: {}", stats.steps);
    println!("  Root Visits: {}", stats.root_visits);
    println!("  Max Depth: {}", stats.max_depth);
    println!("  Jams: {}", stats.jams);
    println!("  Time: {:.3}s", secs);
    println!("  NPS: {:.0} nodes/sec", stats.total_nodes as f64 / secs);
    println!("  GPS: {:.0} games/sec", stats.iterations as f64 / secs);
}

fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);
    if let Err(err) = run(args) {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
