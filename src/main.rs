use assoc_search::{time_fn_call, Campaign, Encoding, Search, SearchConfig, ValueType};

use clap::{ErrorKind, IntoApp, Parser};

#[derive(Parser, Debug)]
struct SearchArgs {
    /// First Morton number to visit.
    morton_start: Option<u32>,
    /// Last Morton number to visit, inclusive.
    morton_max: Option<u32>,
    #[clap(long, default_value = "single")]
    campaign: Campaign,
    #[clap(long)]
    start_leaves: Option<usize>,
    #[clap(long)]
    max_leaves: Option<usize>,
    #[clap(long)]
    iter_tile: Option<u64>,
    #[clap(long, default_value = "i32")]
    ty: ValueType,
    /// `bv` or `int`.
    #[clap(long, default_value = "bv")]
    encoding: Encoding,
    #[clap(long)]
    timeout_ms: Option<u64>,
    #[clap(long)]
    trials: Option<usize>,
    #[clap(long, default_value = "0")]
    seed: u64,
    /// Skip tuples whose slots split into independent groups. Defaults to
    /// on for the triple campaign only.
    #[clap(long)]
    decompose: Option<bool>,
    /// Slot expressions separated by `;`.
    #[clap(long)]
    target: Option<String>,
}

fn config(args: SearchArgs) -> Result<SearchConfig, String> {
    let mut cfg = SearchConfig::default(args.campaign)
        .with_ty(args.ty)
        .with_encoding(args.encoding)
        .with_seed(args.seed);
    if let Some(decompose) = args.decompose {
        cfg = cfg.with_decompose(decompose);
    }
    let morton_start = args.morton_start.unwrap_or(cfg.morton_start);
    let morton_max = args.morton_max.unwrap_or(cfg.morton_max);
    cfg = cfg.with_morton(morton_start, morton_max);
    let start_leaves = args.start_leaves.unwrap_or(cfg.start_leaves);
    let max_leaves = args.max_leaves.unwrap_or(cfg.max_leaves);
    cfg = cfg.with_leaves(start_leaves, max_leaves)?;
    if let Some(iter_tile) = args.iter_tile {
        if iter_tile == 0 {
            return Err("iter tile must be positive".to_string());
        }
        cfg = cfg.with_iter_tile(iter_tile);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        cfg = cfg.with_timeout_ms(timeout_ms);
    }
    if let Some(trials) = args.trials {
        cfg = cfg.with_trials(trials);
    }
    if let Some(target) = args.target {
        cfg = cfg.with_target(&target)?;
    }
    Ok(cfg)
}

pub fn main() {
    env_logger::init();
    let args = SearchArgs::parse();

    let cfg = match config(args) {
        Ok(cfg) => cfg,
        Err(e) => SearchArgs::into_app()
            .error(ErrorKind::InvalidValue, e)
            .exit(),
    };

    let findings = time_fn_call!("search", Search::new(cfg).run());
    log::info!("{} associative tuples", findings.len());
}
