use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use simplelog::LevelFilter;

use reach_rs::config::{SearchConfig, SearchMode};
use reach_rs::encoding::{load_system, write_system};
use reach_rs::parser::parse_file;
use reach_rs::profile::{NoopObserver, Observer, Profiler};
use reach_rs::region::RegionState;
use reach_rs::search::{
    enumerative_breadth_first_search, symbolic_breadth_first_search, EnumerativeHelper, SearchImage, SymbolicHelper,
    SynchronisedHelper,
};
use reach_rs::solver::BddSolver;
use reach_rs::system::TransitionSystem;

#[derive(Debug, Parser)]
#[command(author, version, about = "Breadth-first reachability for labeled transition systems")]
struct Cli {
    /// Transition system, in the DSL unless `--encoded` is given.
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Search engine: unroll, symbolic, enumerative or synchronised.
    #[clap(long, value_name = "MODE", default_value = "unroll")]
    mode: SearchMode,

    /// Depth bound (unbounded by default).
    #[clap(long, value_name = "INT")]
    max_depth: Option<usize>,

    /// Print per-phase timings.
    #[clap(long)]
    profile: bool,

    /// Write the persisted transition system into this folder.
    #[clap(long, value_name = "DIR")]
    save: Option<PathBuf>,

    /// Read FILE in the persisted format.
    #[clap(long)]
    encoded: bool,

    /// Log level.
    #[clap(long, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,

    /// BDD cache size (in bits, so the actual size is `2^size` entries).
    #[clap(long, value_name = "INT", default_value = "16")]
    cache_bits: usize,
}

fn load(path: &Path, encoded: bool) -> color_eyre::Result<TransitionSystem> {
    let system = if encoded {
        load_system(&fs::read_to_string(path)?)?
    } else {
        parse_file(path)?
    };
    Ok(system)
}

fn print_unrolling(system: &TransitionSystem) {
    for depth in 0..=system.current_depth() {
        println!(
            "depth {}: {} new states, {} states, {} transitions",
            depth,
            system.new_states(depth).len(),
            system.all_states(depth).len(),
            system.transitions(depth).len()
        );
    }
    let error = system.error_state();
    if error.has_incoming_transitions() {
        println!("error reached via: {}", error.history().join(" -> "));
    } else {
        println!("no error reached");
    }
}

fn print_image<S: RegionState>(image: &SearchImage<S>) {
    println!("reachable states: {}", image.reachable.len());
    for (depth, errors) in &image.errors_in_depth {
        for error in errors {
            println!("depth {}: {}", depth, error);
        }
    }
    for (label, history) in &image.counterexamples {
        println!("counterexample for {}: {}", label, history.join(" -> "));
    }
    if image.reached_errors.is_empty() {
        println!("no error reached");
    }
}

fn run(
    mode: SearchMode,
    system: &mut TransitionSystem,
    config: &SearchConfig,
    solver: &BddSolver,
    observer: &mut dyn Observer,
) -> color_eyre::Result<()> {
    let max_depth = config.max_search_depth;
    match mode {
        SearchMode::Unroll => {
            let depth = system.unroll(max_depth, solver, observer)?;
            println!("{}: depth {}", mode, depth);
            print_unrolling(system);
        }
        SearchMode::Symbolic => {
            let mut helper = SymbolicHelper::new();
            let image = symbolic_breadth_first_search(system, &mut helper, solver, max_depth, observer)?;
            println!("{}: depth {}", mode, image.result);
            print_image(&image);
        }
        SearchMode::Synchronised => {
            let mut helper = SynchronisedHelper::new(system.stop_flag());
            let image = symbolic_breadth_first_search(system, &mut helper, solver, max_depth, observer)?;
            println!("{}: depth {}", mode, image.result);
            print_image(&image);
        }
        SearchMode::Enumerative => {
            let mut helper = EnumerativeHelper::new();
            let image = enumerative_breadth_first_search(system, &mut helper, solver, max_depth, observer)?;
            println!("{}: depth {}", mode, image.result);
            print_image(&image);
        }
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = Instant::now();

    let mut config = SearchConfig::for_mode(args.mode);
    config.max_search_depth = args.max_depth;
    config.profile = args.profile;
    if let Some(folder) = &args.save {
        config.result_folder = folder.clone();
        config.save_transition_system = true;
    }

    let solver = BddSolver::new(args.cache_bits);
    for mode in config.modes() {
        let mut system = load(&args.input, args.encoded)?;
        if config.profile {
            let mut profiler = Profiler::new();
            run(mode, &mut system, &config, &solver, &mut profiler)?;
            println!("{}", profiler.report());
        } else {
            run(mode, &mut system, &config, &solver, &mut NoopObserver)?;
        }

        if config.save_transition_system {
            fs::create_dir_all(&config.result_folder)?;
            fs::write(config.system_file(), write_system(&system))?;
            println!("transition system saved to {}", config.system_file().display());
        }
    }

    println!("solver: {:?}", solver.stats());
    println!("All done in {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
