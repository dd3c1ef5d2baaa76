//! Pricing strategies.
//!
//! A pricer chooses the entering variable (ENTER mode) from the reduced
//! costs, or the leaving slot (LEAVE mode) from the primal infeasibilities.
//! The weighted strategies maintain their reference weights through the
//! `entered`/`left` hooks after every pivot. Ties always break to the
//! smallest index so runs are reproducible.

use enum_dispatch::enum_dispatch;

use super::desc::VarStatus;
use super::{var_col_dot, Core, IterWork, Mode};
use crate::settings::PricerSelection;
use crate::{E, I};

/// Floor for maintained weights; keeps degraded approximations harmless.
const WEIGHT_FLOOR: E = 1e-10;
/// Devex restarts its reference framework above this weight.
const DEVEX_RESTART: E = 1e9;

#[enum_dispatch]
pub(crate) trait Pricer {
    /// Prepares internal weights for a (re)started loop in the given mode.
    fn setup(&mut self, core: &Core, mode: Mode);

    /// ENTER mode: the most attractive nonbasic variable, if any violates
    /// dual feasibility beyond the tolerance.
    fn select_enter(&mut self, core: &Core) -> Option<I>;

    /// LEAVE mode: the most attractive infeasible basic slot, if any.
    fn select_leave(&mut self, core: &Core) -> Option<I>;

    /// Hook after an entering pivot. `left_id` is the variable that became
    /// nonbasic in the swap.
    fn entered(&mut self, core: &mut Core, work: &IterWork, enter_id: I, leave_slot: I, left_id: I);

    /// Hook after a leaving pivot.
    fn left(&mut self, core: &mut Core, work: &IterWork, leave_slot: I, enter_id: I);

    /// Hook after a refactorization.
    fn refactored(&mut self, _core: &Core) {}

    /// Hook when structural vectors are appended to the problem.
    fn added_vecs(&mut self, _n: usize) {}

    /// Hook when rows (co-vectors) are appended to the problem.
    fn added_covecs(&mut self, _n: usize) {}
}

/// Dual-feasibility violation of a nonbasic variable, or 0.
fn enter_violation(core: &Core, id: I) -> E {
    if core.is_basic(id) {
        return 0.;
    }
    let d = core.reduced_cost(id);
    let viol = match core.desc.status(id) {
        VarStatus::PLower => -d,
        VarStatus::PUpper => d,
        VarStatus::PFree => d.abs(),
        _ => return 0.,
    };
    if viol > core.opttol {
        viol
    } else {
        0.
    }
}

fn leave_violation(core: &Core, slot: I) -> E {
    let viol = core.ftest(slot).abs();
    if viol > core.feastol {
        viol
    } else {
        0.
    }
}

// ---------------------------------------------------------------------------
// Dantzig
// ---------------------------------------------------------------------------

/// Textbook pricing: largest violation wins.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dantzig;

impl Pricer for Dantzig {
    fn setup(&mut self, _core: &Core, _mode: Mode) {}

    fn select_enter(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for id in 0..core.total() {
            let viol = enter_violation(core, id);
            if viol > 0. && best.map_or(true, |(_, b)| viol > b) {
                best = Some((id, viol));
            }
        }
        best.map(|(id, _)| id)
    }

    fn select_leave(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for slot in 0..core.m {
            let viol = leave_violation(core, slot);
            if viol > 0. && best.map_or(true, |(_, b)| viol > b) {
                best = Some((slot, viol));
            }
        }
        best.map(|(slot, _)| slot)
    }

    fn entered(
        &mut self,
        _core: &mut Core,
        _work: &IterWork,
        _enter_id: I,
        _leave_slot: I,
        _left_id: I,
    ) {
    }

    fn left(&mut self, _core: &mut Core, _work: &IterWork, _leave_slot: I, _enter_id: I) {}
}

// ---------------------------------------------------------------------------
// Partial multiple pricing
// ---------------------------------------------------------------------------

/// Dantzig scores over a rotating candidate window. The window advances
/// every call, so the full set is rescanned within a bounded number of
/// iterations and progress is guaranteed.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParMult {
    cursor: usize,
    window: usize,
}

impl ParMult {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn window_for(len: usize) -> usize {
        (len / 4).clamp(10, 1000).min(len.max(1))
    }
}

impl Pricer for ParMult {
    fn setup(&mut self, core: &Core, mode: Mode) {
        self.cursor = 0;
        self.window = match mode {
            Mode::Enter => Self::window_for(core.total()),
            Mode::Leave => Self::window_for(core.m),
        };
    }

    fn select_enter(&mut self, core: &Core) -> Option<I> {
        let len = core.total();
        if len == 0 {
            return None;
        }
        let mut best: Option<(I, E)> = None;
        for k in 0..self.window {
            let id = (self.cursor + k) % len;
            let viol = enter_violation(core, id);
            if viol > 0. && best.map_or(true, |(bid, b)| viol > b || (viol == b && id < bid)) {
                best = Some((id, viol));
            }
        }
        self.cursor = (self.cursor + self.window) % len;
        if best.is_none() {
            // Nothing in the window; fall back to a full scan before
            // declaring optimality.
            return Dantzig.select_enter(core);
        }
        best.map(|(id, _)| id)
    }

    fn select_leave(&mut self, core: &Core) -> Option<I> {
        let len = core.m;
        if len == 0 {
            return None;
        }
        let mut best: Option<(I, E)> = None;
        for k in 0..self.window {
            let slot = (self.cursor + k) % len;
            let viol = leave_violation(core, slot);
            if viol > 0. && best.map_or(true, |(bs, b)| viol > b || (viol == b && slot < bs)) {
                best = Some((slot, viol));
            }
        }
        self.cursor = (self.cursor + self.window) % len;
        if best.is_none() {
            return Dantzig.select_leave(core);
        }
        best.map(|(slot, _)| slot)
    }

    fn entered(
        &mut self,
        _core: &mut Core,
        _work: &IterWork,
        _enter_id: I,
        _leave_slot: I,
        _left_id: I,
    ) {
    }

    fn left(&mut self, _core: &mut Core, _work: &IterWork, _leave_slot: I, _enter_id: I) {}
}

// ---------------------------------------------------------------------------
// Devex
// ---------------------------------------------------------------------------

/// Devex pricing with reference weights; scores are squared violations over
/// the weights, and weights grow with the square of the pivot-row ratios.
#[derive(Debug, Clone, Default)]
pub(crate) struct Devex {
    /// Per-variable weights (ENTER mode).
    pweights: Vec<E>,
    /// Per-slot weights (LEAVE mode).
    cweights: Vec<E>,
}

impl Devex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn restart_if_degraded(&mut self) {
        if self.pweights.iter().any(|&w| w > DEVEX_RESTART) {
            self.pweights.iter_mut().for_each(|w| *w = 1.);
        }
        if self.cweights.iter().any(|&w| w > DEVEX_RESTART) {
            self.cweights.iter_mut().for_each(|w| *w = 1.);
        }
    }
}

impl Pricer for Devex {
    fn setup(&mut self, core: &Core, _mode: Mode) {
        self.pweights.clear();
        self.pweights.resize(core.total(), 1.);
        self.cweights.clear();
        self.cweights.resize(core.m, 1.);
    }

    fn select_enter(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for id in 0..core.total() {
            let viol = enter_violation(core, id);
            if viol == 0. {
                continue;
            }
            let score = viol * viol / self.pweights[id];
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn select_leave(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for slot in 0..core.m {
            let viol = leave_violation(core, slot);
            if viol == 0. {
                continue;
            }
            let score = viol * viol / self.cweights[slot];
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((slot, score));
            }
        }
        best.map(|(slot, _)| slot)
    }

    fn entered(&mut self, core: &mut Core, work: &IterWork, enter_id: I, leave_slot: I, left_id: I) {
        let alpha_r = work.alpha.value(leave_slot);
        if alpha_r == 0. {
            return;
        }
        let gamma = self.pweights[enter_id];
        for k in 0..work.zp.len() {
            let j = work.zp.index_mem()[k];
            if core.is_basic(j) {
                continue;
            }
            let ratio = work.zp.value(j) / alpha_r;
            let w = ratio * ratio * gamma;
            if w > self.pweights[j] {
                self.pweights[j] = w;
            }
        }
        for k in 0..work.zc.len() {
            let i = work.zc.index_mem()[k];
            let id = core.n + i;
            if core.is_basic(id) {
                continue;
            }
            let ratio = work.zc.value(i) / alpha_r;
            let w = ratio * ratio * gamma;
            if w > self.pweights[id] {
                self.pweights[id] = w;
            }
        }
        self.pweights[left_id] = (gamma / (alpha_r * alpha_r)).max(1.);
        self.restart_if_degraded();
    }

    fn left(&mut self, _core: &mut Core, work: &IterWork, leave_slot: I, _enter_id: I) {
        let alpha_r = work.alpha.value(leave_slot);
        if alpha_r == 0. {
            return;
        }
        let gamma = self.cweights[leave_slot];
        for k in 0..work.alpha.len() {
            let slot = work.alpha.index_mem()[k];
            if slot == leave_slot {
                continue;
            }
            let ratio = work.alpha.value(slot) / alpha_r;
            let w = ratio * ratio * gamma;
            if w > self.cweights[slot] {
                self.cweights[slot] = w;
            }
        }
        self.cweights[leave_slot] = (gamma / (alpha_r * alpha_r)).max(1.);
        self.restart_if_degraded();
    }
}

// ---------------------------------------------------------------------------
// Steepest edge
// ---------------------------------------------------------------------------

/// Steepest-edge pricing with Forrest-Goldfarb weight updates.
///
/// With `exact_setup`, weights start from the column norms, which is the
/// exact value `1 + ||B^{-1} a_j||^2` for a slack starting basis; the quick
/// variant starts from unit weights.
#[derive(Debug, Clone)]
pub(crate) struct SteepestEdge {
    exact_setup: bool,
    /// Per-variable weights `1 + ||B^{-1} a_j||^2` (ENTER mode).
    pweights: Vec<E>,
    /// Per-slot weights `||B^{-T} e_i||^2` (LEAVE mode).
    cweights: Vec<E>,
    scratch: Vec<E>,
}

impl SteepestEdge {
    pub(crate) fn new(exact_setup: bool) -> Self {
        Self {
            exact_setup,
            pweights: Vec::new(),
            cweights: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl Pricer for SteepestEdge {
    fn setup(&mut self, core: &Core, mode: Mode) {
        self.scratch.clear();
        self.scratch.resize(core.m, 0.);
        match mode {
            Mode::Enter => {
                self.pweights.clear();
                self.pweights.resize(core.total(), 1.);
                if self.exact_setup {
                    for id in 0..core.total() {
                        let norm2 = if id < core.n {
                            let (_, vals) = core.mat.col(id);
                            vals.iter().map(|v| v * v).sum::<E>()
                        } else {
                            1.
                        };
                        self.pweights[id] = 1. + norm2;
                    }
                }
            }
            Mode::Leave => {
                self.cweights.clear();
                self.cweights.resize(core.m, 1.);
            }
        }
    }

    fn select_enter(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for id in 0..core.total() {
            let viol = enter_violation(core, id);
            if viol == 0. {
                continue;
            }
            let score = viol * viol / self.pweights[id].max(WEIGHT_FLOOR);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn select_leave(&mut self, core: &Core) -> Option<I> {
        let mut best: Option<(I, E)> = None;
        for slot in 0..core.m {
            let viol = leave_violation(core, slot);
            if viol == 0. {
                continue;
            }
            let score = viol * viol / self.cweights[slot].max(WEIGHT_FLOOR);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((slot, score));
            }
        }
        best.map(|(slot, _)| slot)
    }

    fn entered(&mut self, core: &mut Core, work: &IterWork, enter_id: I, leave_slot: I, left_id: I) {
        if self.pweights.is_empty() {
            return;
        }
        let alpha_r = work.alpha.value(leave_slot);
        if alpha_r == 0. {
            return;
        }
        let gamma_q = self.pweights[enter_id];

        // tau = B^{-T} alpha, for the cross terms of the update.
        for i in 0..core.m {
            self.scratch[i] = work.alpha.value(i);
        }
        core.factor.btran(&mut self.scratch);

        for k in 0..work.zp.len() {
            let j = work.zp.index_mem()[k];
            if core.is_basic(j) {
                continue;
            }
            let ratio = work.zp.value(j) / alpha_r;
            let cross = var_col_dot(&core.mat, core.n, j, &self.scratch);
            let w = self.pweights[j] - 2. * ratio * cross + ratio * ratio * gamma_q;
            self.pweights[j] = w.max(1. + ratio * ratio).max(WEIGHT_FLOOR);
        }
        for k in 0..work.zc.len() {
            let i = work.zc.index_mem()[k];
            let id = core.n + i;
            if core.is_basic(id) {
                continue;
            }
            // The logical column is -e_i, so its pivot-row entry is -rho_i
            // and its cross term is -tau_i.
            let ratio = -work.zc.value(i) / alpha_r;
            let cross = -self.scratch[i];
            let w = self.pweights[id] - 2. * ratio * cross + ratio * ratio * gamma_q;
            self.pweights[id] = w.max(1. + ratio * ratio).max(WEIGHT_FLOOR);
        }

        for v in self.scratch.iter_mut() {
            *v = 0.;
        }
        self.pweights[left_id] =
            (gamma_q / (alpha_r * alpha_r)).max(1. + 1. / (alpha_r * alpha_r));
    }

    fn left(&mut self, core: &mut Core, work: &IterWork, leave_slot: I, _enter_id: I) {
        if self.cweights.is_empty() {
            return;
        }
        let alpha_r = work.alpha.value(leave_slot);
        if alpha_r == 0. {
            return;
        }
        let gamma_r = self.cweights[leave_slot];

        // tau = B^{-1} rho, for the cross terms of the dual update.
        for i in 0..core.m {
            self.scratch[i] = work.rho.value(i);
        }
        core.factor.ftran(&mut self.scratch);

        for k in 0..work.alpha.len() {
            let slot = work.alpha.index_mem()[k];
            if slot == leave_slot {
                continue;
            }
            let ratio = work.alpha.value(slot) / alpha_r;
            let w = self.cweights[slot] - 2. * ratio * self.scratch[slot] + ratio * ratio * gamma_r;
            self.cweights[slot] = w.max(ratio * ratio * gamma_r * 1e-3).max(WEIGHT_FLOOR);
        }
        self.cweights[leave_slot] = (gamma_r / (alpha_r * alpha_r)).max(WEIGHT_FLOOR);
        for v in self.scratch.iter_mut() {
            *v = 0.;
        }
    }

    fn refactored(&mut self, _core: &Core) {}
}

// ---------------------------------------------------------------------------
// Hybrid
// ---------------------------------------------------------------------------

/// Steepest edge until the first refactorization; switches to Devex once
/// the maintained weights decay.
pub(crate) struct Hybrid {
    steep: SteepestEdge,
    devex: Devex,
    use_devex: bool,
    refactor_seen: bool,
    mode: Mode,
}

impl Hybrid {
    pub(crate) fn new(exact_setup: bool) -> Self {
        Self {
            steep: SteepestEdge::new(exact_setup),
            devex: Devex::new(),
            use_devex: false,
            refactor_seen: false,
            mode: Mode::Leave,
        }
    }

    fn weights_decayed(&self) -> bool {
        let decayed = |ws: &[E]| ws.iter().any(|&w| w < 1e-4);
        decayed(&self.steep.pweights) || decayed(&self.steep.cweights)
    }
}

impl Pricer for Hybrid {
    fn setup(&mut self, core: &Core, mode: Mode) {
        self.mode = mode;
        if self.use_devex {
            self.devex.setup(core, mode);
        } else {
            self.steep.setup(core, mode);
        }
    }

    fn select_enter(&mut self, core: &Core) -> Option<I> {
        if self.use_devex {
            self.devex.select_enter(core)
        } else {
            self.steep.select_enter(core)
        }
    }

    fn select_leave(&mut self, core: &Core) -> Option<I> {
        if self.use_devex {
            self.devex.select_leave(core)
        } else {
            self.steep.select_leave(core)
        }
    }

    fn entered(&mut self, core: &mut Core, work: &IterWork, enter_id: I, leave_slot: I, left_id: I) {
        if self.use_devex {
            self.devex.entered(core, work, enter_id, leave_slot, left_id)
        } else {
            self.steep.entered(core, work, enter_id, leave_slot, left_id)
        }
    }

    fn left(&mut self, core: &mut Core, work: &IterWork, leave_slot: I, enter_id: I) {
        if self.use_devex {
            self.devex.left(core, work, leave_slot, enter_id)
        } else {
            self.steep.left(core, work, leave_slot, enter_id)
        }
    }

    fn refactored(&mut self, core: &Core) {
        if self.use_devex {
            return;
        }
        if self.refactor_seen && self.weights_decayed() {
            self.use_devex = true;
            self.devex.setup(core, self.mode);
        }
        self.refactor_seen = true;
    }
}

// ---------------------------------------------------------------------------
// Strategy enum
// ---------------------------------------------------------------------------

/// The configured pricing strategies.
#[enum_dispatch(Pricer)]
pub(crate) enum Pricers {
    Dantzig(Dantzig),
    ParMult(ParMult),
    Devex(Devex),
    Steep(SteepestEdge),
    Hybrid(Hybrid),
}

impl Pricers {
    /// Maps the configured selection to a strategy. `Auto` behaves like the
    /// hybrid pricer; a requested partial pricing overrides the selection
    /// with the rotating-window pricer.
    pub(crate) fn from_selection(selection: PricerSelection, partial: bool) -> Self {
        if partial {
            return Pricers::ParMult(ParMult::new());
        }
        match selection {
            PricerSelection::Dantzig => Pricers::Dantzig(Dantzig),
            PricerSelection::ParMult => Pricers::ParMult(ParMult::new()),
            PricerSelection::Devex => Pricers::Devex(Devex::new()),
            PricerSelection::Steep => Pricers::Steep(SteepestEdge::new(true)),
            PricerSelection::SteepQuick => Pricers::Steep(SteepestEdge::new(false)),
            PricerSelection::Hybrid => Pricers::Hybrid(Hybrid::new(true)),
            PricerSelection::Auto => Pricers::Hybrid(Hybrid::new(false)),
        }
    }
}
