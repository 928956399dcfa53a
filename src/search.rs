use std::fmt;

use egg::RecExpr;
use itertools::Itertools;
use log::{debug, info};
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::{
    filter::{is_decomposable, should_skip_expression},
    grammar::{Bindings, Campaign, Grammar},
    lang::Arith,
    prover::{
        prove_associativity, AssociativeIds, Encoding, IsAssociative, Orientation,
        DEFAULT_TIMEOUT_MS,
    },
    scheduler::{IntervalSet, Tile, Tiling},
    screen::{fast_check_associativity, ScreenVerdict, DEFAULT_TRIALS},
    table, time_fn_call,
    tree::{generate, AssocTuple, SlotExpr, MAX_LEAVES},
    value::ValueType,
    HashMap, HashSet,
};

pub struct SearchConfig {
    pub campaign: Campaign,
    pub grammar: Grammar,
    pub ty: ValueType,
    pub encoding: Encoding,
    pub morton_start: u32,
    pub morton_max: u32,
    pub start_leaves: usize,
    pub max_leaves: usize,
    pub leaves_tile: usize,
    pub iter_tile: u64,
    pub trials: usize,
    pub timeout_ms: u64,
    pub seed: u64,
    /// Skip tuples whose slots split into independent groups.
    pub decompose: bool,
    /// Stop as soon as this tuple comes up.
    pub target: Option<Vec<String>>,
}

impl SearchConfig {
    pub fn default(campaign: Campaign) -> Self {
        let (start_leaves, max_leaves) = campaign.leaf_bounds();
        Self {
            campaign,
            grammar: campaign.grammar(),
            ty: ValueType::I32,
            encoding: Encoding::default(),
            morton_start: 0,
            morton_max: 15,
            start_leaves,
            max_leaves,
            leaves_tile: 3,
            iter_tile: campaign.iter_tile(),
            trials: DEFAULT_TRIALS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            seed: 0,
            decompose: campaign.decompose_by_default(),
            target: None,
        }
    }

    pub fn with_ty(mut self, ty: ValueType) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_morton(mut self, start: u32, max: u32) -> Self {
        self.morton_start = start;
        self.morton_max = max;
        self
    }

    pub fn with_leaves(mut self, start: usize, max: usize) -> Result<Self, String> {
        if start < 1 || start > max || max > MAX_LEAVES {
            return Err(format!(
                "leaf range [{}, {}] must lie within [1, {}]",
                start, max, MAX_LEAVES
            ));
        }
        self.start_leaves = start;
        self.max_leaves = max;
        Ok(self)
    }

    pub fn with_iter_tile(mut self, iter_tile: u64) -> Self {
        assert!(iter_tile > 0);
        self.iter_tile = iter_tile;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_decompose(mut self, decompose: bool) -> Self {
        self.decompose = decompose;
        self
    }

    /// `target` holds one expression per slot, separated by `;`.
    pub fn with_target(mut self, target: &str) -> Result<Self, String> {
        let exprs = parse_target(target)?;
        if exprs.len() != self.grammar.tuple_size {
            return Err(format!(
                "target has {} expressions but the {:?} campaign has {} slots",
                exprs.len(),
                self.campaign,
                self.grammar.tuple_size
            ));
        }
        self.target = Some(exprs.iter().map(|e| e.to_string()).collect());
        Ok(self)
    }

    pub fn tiling(&self) -> Tiling {
        Tiling {
            start_leaves: self.start_leaves,
            max_leaves: self.max_leaves,
            leaves_tile: self.leaves_tile,
            iter_tile: self.iter_tile,
        }
    }
}

pub fn parse_target(s: &str) -> Result<Vec<RecExpr<Arith>>, String> {
    s.split(';')
        .map(|part| {
            let part = part.trim();
            part.parse::<RecExpr<Arith>>()
                .map_err(|e| format!("invalid target expression {}: {}", part, e))
        })
        .collect()
}

/// A tuple that was not disproved and has an identity.
#[derive(Clone, Debug)]
pub struct Finding {
    /// Leaf count and index of each slot.
    pub coordinates: Vec<(usize, u64)>,
    pub tuple: AssocTuple,
    pub exprs: Vec<RecExpr<Arith>>,
    /// `Yes`, or `Unknown` if the solver gave up.
    pub verdict: IsAssociative,
    pub ids: AssociativeIds,
    /// Already listed in the table of known operators.
    pub known: bool,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [(leaves, index)] = self.coordinates.as_slice() {
            write!(f, "Leaves: {}, i: {}, ", leaves, index)?;
        } else {
            for (slot, (leaves, index)) in self.coordinates.iter().enumerate() {
                write!(f, "Leaves{}: {}, i{}: {}, ", slot, leaves, slot, index)?;
            }
        }
        write!(f, "{} -> ", self.tuple)?;
        let side = match (&self.verdict, self.ids.orientation) {
            (IsAssociative::Yes, Orientation::Left) => "Left-associativity with identity: ",
            (IsAssociative::Yes, Orientation::Right) => "Right-associativity with identity: ",
            (_, Orientation::Left) => "UNKNOWN associative with left-identity: ",
            (_, Orientation::Right) => "UNKNOWN associative with right-identity: ",
            (_, Orientation::Unknown) => "UNKNOWN associative: ",
        };
        write!(f, "{}{}", side, self.ids)?;
        if self.known {
            write!(f, " (known)")?;
        }
        Ok(())
    }
}

/// A slot expression that survived the filter, at its coordinate.
#[derive(Clone)]
struct Candidate {
    leaves: usize,
    index: u64,
    slot: SlotExpr,
    expr: RecExpr<Arith>,
}

/// Walks the tiles of one campaign and reports associative tuples.
pub struct Search {
    config: SearchConfig,
    bindings: Bindings,
    /// Per leaf count: indices that decode past the end or are filtered out.
    /// Shared by every slot since the filter does not depend on the slot.
    invalid: Vec<IntervalSet>,
    /// Filtered slot expressions of the current tile.
    kept: HashMap<(usize, u64), (SlotExpr, RecExpr<Arith>)>,
    /// Per slot: expressions already used at this position of the tuple.
    seen: Vec<HashSet<SlotExpr>>,
    /// Per leaf count of slot 0.
    associative: Vec<HashSet<AssocTuple>>,
    not_associative: Vec<HashSet<AssocTuple>>,
    rng: Pcg64,
    findings: Vec<Finding>,
    done: bool,
}

impl Search {
    pub fn new(config: SearchConfig) -> Self {
        let bindings = config.grammar.bindings();
        let levels = config.max_leaves + 1;
        let slots = config.grammar.tuple_size;
        Self {
            rng: Pcg64::seed_from_u64(config.seed),
            bindings,
            invalid: vec![IntervalSet::new(); levels],
            kept: HashMap::default(),
            seen: vec![HashSet::default(); slots],
            associative: vec![HashSet::default(); levels],
            not_associative: vec![HashSet::default(); levels],
            findings: vec![],
            done: false,
            config,
        }
    }

    pub fn run(mut self) -> Vec<Finding> {
        let tiling = self.config.tiling();
        for morton in self.config.morton_start..=self.config.morton_max {
            if self.done {
                break;
            }
            self.visit(&tiling, morton);
        }
        self.findings
    }

    fn visit(&mut self, tiling: &Tiling, morton: u32) {
        let tile = match tiling.tile(morton) {
            Some(tile) => tile,
            None => {
                debug!("Morton: {} is past the leaf bounds", morton);
                return;
            }
        };
        info!(
            "Morton: {}, leaves: [{}, {}], i: [{}, {}]",
            morton,
            tile.leaves.start(),
            tile.leaves.end(),
            tile.indices.start(),
            tile.indices.end()
        );
        // tiles never overlap, so nothing kept for an earlier one comes back
        self.kept.clear();
        time_fn_call!(format!("morton {}", morton), {
            self.walk(&tile, 0, &mut vec![])
        });
        info!(
            "Valid: {}, invalid intervals: {}",
            self.findings.len(),
            self.invalid.iter().map(IntervalSet::interval_count).sum::<usize>()
        );
    }

    fn walk(&mut self, tile: &Tile, slot: usize, chosen: &mut Vec<Candidate>) {
        for leaves in tile.leaves.clone() {
            let bound = self.config.grammar.index_bound(leaves);
            if bound == 0 {
                continue;
            }
            let lo = *tile.indices.start();
            let hi = (*tile.indices.end()).min(bound - 1);
            for range in self.invalid[leaves].gaps(lo, hi) {
                for index in range {
                    if self.done {
                        return;
                    }
                    // deeper slots may have grown the set since the gaps were taken
                    if self.invalid[leaves].contains(index) {
                        continue;
                    }
                    let candidate = match self.candidate(slot, leaves, index) {
                        Some(candidate) => candidate,
                        None => continue,
                    };
                    chosen.push(candidate);
                    if slot + 1 == self.config.grammar.tuple_size {
                        self.check(chosen);
                    } else {
                        self.walk(tile, slot + 1, chosen);
                        for seen in &mut self.seen[slot + 1..] {
                            seen.clear();
                        }
                    }
                    chosen.pop();
                }
            }
        }
    }

    fn candidate(&mut self, slot: usize, leaves: usize, index: u64) -> Option<Candidate> {
        let (expr, rendered) = match self.kept.get(&(leaves, index)) {
            Some(kept) => kept.clone(),
            None => {
                let (expr, remainder) = generate(&self.config.grammar, leaves, index);
                if remainder != 0 {
                    self.invalid[leaves].insert(index);
                    return None;
                }
                match should_skip_expression(&expr, &self.bindings) {
                    Ok(rendered) => {
                        self.kept
                            .insert((leaves, index), (expr.clone(), rendered.clone()));
                        (expr, rendered)
                    }
                    Err(reason) => {
                        debug!("...Skip leaves: {}, i: {}: {}; {}", leaves, index, expr, reason);
                        self.invalid[leaves].insert(index);
                        return None;
                    }
                }
            }
        };
        if !self.seen[slot].insert(expr.clone()) {
            debug!("...Skip duplicate leaves: {}, i: {}: {}", leaves, index, expr);
            return None;
        }
        Some(Candidate {
            leaves,
            index,
            slot: expr,
            expr: rendered,
        })
    }

    fn check(&mut self, chosen: &[Candidate]) {
        let tuple = AssocTuple(chosen.iter().map(|c| c.slot.clone()).collect());
        let exprs: Vec<RecExpr<Arith>> = chosen.iter().map(|c| c.expr.clone()).collect();
        let coordinates: Vec<(usize, u64)> = chosen.iter().map(|c| (c.leaves, c.index)).collect();
        let leaves0 = chosen[0].leaves;

        if let Some(target) = &self.config.target {
            if exprs.iter().map(|e| e.to_string()).eq(target.iter().cloned()) {
                info!(
                    "found target {} at {}",
                    tuple,
                    coordinates
                        .iter()
                        .map(|(l, i)| format!("leaves {} i {}", l, i))
                        .join(", ")
                );
                self.done = true;
                return;
            }
        }

        if self.config.decompose
            && tuple.len() > 1
            && is_decomposable(&tuple.uses_x(), &tuple.uses_y())
        {
            debug!("...Skip decomposable {}", tuple);
            return;
        }
        if self.not_associative[leaves0].contains(&tuple) {
            return;
        }

        let verdict = fast_check_associativity(
            &tuple,
            self.config.ty,
            self.config.grammar.constants,
            self.config.trials,
            &mut self.rng,
            &self.associative[leaves0],
        );
        match verdict {
            ScreenVerdict::NotAssociative(witness) => {
                debug!("...Not associative {}: {:?}", tuple, witness);
                self.not_associative[leaves0].insert(tuple);
                return;
            }
            other if other.skip() => {
                debug!("...Skip {}: {:?}", tuple, other);
                return;
            }
            _ => {}
        }

        let (result, ids) = prove_associativity(
            &exprs,
            &self.bindings,
            self.config.ty,
            self.config.encoding,
            self.config.timeout_ms,
        );
        match &result {
            IsAssociative::No(cex) => {
                debug!("...Disproved {}: {}", tuple, cex);
                self.not_associative[leaves0].insert(tuple);
                return;
            }
            IsAssociative::Yes => {
                self.associative[leaves0].insert(tuple.clone());
            }
            IsAssociative::Unknown => {}
        }
        if ids.orientation == Orientation::Unknown {
            debug!("...No identity for {} ({:?})", tuple, result);
            return;
        }

        let known = self.config.ty == ValueType::I32 && table::lookup(&exprs).is_some();
        let finding = Finding {
            coordinates,
            tuple,
            exprs,
            verdict: result,
            ids,
            known,
        };
        println!("{}", finding);
        self.findings.push(finding);
    }
}
