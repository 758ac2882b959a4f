use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use treesearch::envs::walker::{Push, WalkerSim, WalkerState};
use treesearch::sampler::{EndScore, RandomSampler, Sampler, UcbSampler};
use treesearch::stage::FixedGames;
use treesearch::value::Average;
use treesearch::{Search, SearchConfig, SearchError, SearchStatistics, SearchTree};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Games per run (default: 200,000)
    #[arg(long, default_value_t = 200_000)]
    games: u64,

    /// Worker counts to compare, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = vec![1, 2, 4, 8])]
    workers: Vec<usize>,

    /// Longest push or coast, in ticks
    #[arg(long, default_value_t = 4)]
    max_duration: u32,

    /// Rollout length for the UCB sampler
    #[arg(long, default_value_t = 10)]
    rollout_steps: u32,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Skip the uniform random sampler runs
    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    ucb_only: bool,
}

fn main() {
    let args = Args::parse();

    println!("Parallel Tree Search - Benchmark Tool");
    println!("=====================================");
    println!("Environment: balancing walker (max duration {})", args.max_duration);
    println!("Games per run: {}", args.games);
    println!("Worker counts: {:?}", args.workers);
    println!("-------------------------------------");

    #[cfg(debug_assertions)]
    println!("WARNING: Running in debug mode. Performance will be significantly lower.\nUse --release for accurate benchmarks.\n");

    for &workers in &args.workers {
        let config = SearchConfig::default()
            .with_workers(workers)
            .with_seed(args.seed)
            .with_rollout_steps(args.rollout_steps)
            .with_poll_interval(Duration::from_millis(10));

        let eval = WalkerSim::evaluation();
        let rollout = Arc::new(EndScore::new(eval.clone(), config.rollout.clone()));
        let ucb = UcbSampler::new(config.ucb.clone(), eval.clone(), rollout, Arc::new(Average));
        bench(&format!("UCB x{workers}"), &args, config.clone(), Box::new(ucb));

        if !args.ucb_only {
            bench(&format!("Random x{workers}"), &args, config, Box::new(RandomSampler::new(eval)));
        }
    }
}

fn bench(name: &str, args: &Args, config: SearchConfig, sampler: Box<dyn Sampler<Push, WalkerState>>) {
    println!("\nRunning {name}...");
    match run(args, config, sampler) {
        Ok((stats, duration)) => print_stats(name, &stats, duration),
        Err(err) => println!("{name} failed: {err}"),
    }
}

fn run(
    args: &Args,
    config: SearchConfig,
    sampler: Box<dyn Sampler<Push, WalkerState>>,
) -> Result<(SearchStatistics, Duration), SearchError> {
    let tree = SearchTree::new(
        WalkerState::initial(),
        Arc::new(WalkerSim::action_generator(args.max_duration)),
    );
    let mut search = Search::with_sampler(config, tree, sampler, Box::new(WalkerSim::default()))?;
    let root = search.tree().root();

    let start = Instant::now();
    search.run_stage(&mut FixedGames::new(args.games), root)?;
    Ok((search.statistics(), start.elapsed()))
}

fn print_stats(name: &str, stats: &SearchStatistics, duration: Duration) {
    let secs = duration.as_secs_f64();
    let nps = stats.total_nodes as f64 / secs;
    let gps = stats.iterations as f64 / secs;

    println!("{} Results:", name);
    println!("  Total Nodes: {}", stats.total_nodes);
    println!("  Time: {:.3}s", secs);
    println!("  NPS: {:.0} nodes/sec", nps);
    println!("  GPS: {:.0} games/sec", gps);
    println!("  Root Visits: {}", stats.root_visits);
    println!("  Max Depth: {}", stats.max_depth);
    println!("  Jams: {}", stats.jams);
}
