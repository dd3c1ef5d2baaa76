//! Ratio-test strategies.
//!
//! Given a pivot direction, a ratio tester finds the maximum feasible step
//! and the variable that blocks it first. In ENTER mode the test runs in
//! primal space over the FTRAN of the entering column; in LEAVE mode it runs
//! in dual space over the pivot row, where the bound-flipping tester can
//! perform long steps across boxed nonbasic variables.

use enum_dispatch::enum_dispatch;

use super::{var_col_dot, Core, IterWork};
use crate::settings::{RatioTesterSelection, Representation};
use crate::{is_unbounded, E, I, INFTY};

const MINSTAB: E = 1e-5;
const LOWSTAB: E = 1e-10;
const MAX_RELAX_COUNT: usize = 2;
const LONGSTEP_FREQ: usize = 500;
const MIN_LONGSTEP: E = 1e-6;

/// Marker for breakpoints whose variable turned out to be basic.
const MARKED: I = usize::MAX;

/// Outcome of the ENTER-mode (primal) ratio test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaveChoice {
    /// The basic variable in this slot blocks first.
    Slot(I),
    /// The entering variable reaches its opposite bound first.
    Flip,
    /// Nothing blocks the direction.
    Unbounded,
    /// No pivot of acceptable stability was found.
    Unstable,
}

/// Outcome of the LEAVE-mode (dual) ratio test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnterChoice {
    Id(I),
    /// The dual is unbounded along this direction: the LP is infeasible.
    Infeasible,
    /// No pivot of acceptable stability was found.
    Unstable,
}

#[enum_dispatch]
pub(crate) trait RatioTester {
    /// Installs the working tolerances for a new solve.
    fn reset(&mut self, feastol: E, epsilon: E);

    /// ENTER mode: pick the leaving slot along the direction in
    /// `work.alpha`. On entry `val` holds the entering variable's own bound
    /// range; on exit the chosen step.
    fn select_leave(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        enter_id: I,
        dir: E,
        val: &mut E,
    ) -> LeaveChoice;

    /// LEAVE mode: pick the entering variable along the pivot row in
    /// `work.zp`/`work.zc`. On entry `val` carries the signed direction
    /// budget; on exit the chosen signed dual step.
    fn select_enter(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        leave_slot: I,
        val: &mut E,
    ) -> EnterChoice;
}

/// Shared tolerance state with the relax/tighten ladder.
#[derive(Debug, Clone, Copy)]
struct Tols {
    delta0: E,
    delta: E,
    epsilon: E,
    /// Relative stability demand on the pivot magnitude.
    minstab: E,
}

impl Tols {
    fn new() -> Self {
        Self {
            delta0: 1e-6,
            delta: 1e-6,
            epsilon: 1e-16,
            minstab: MINSTAB,
        }
    }

    fn install(&mut self, feastol: E, epsilon: E) {
        self.delta0 = feastol;
        self.delta = feastol;
        self.epsilon = epsilon;
        self.minstab = MINSTAB;
    }

    fn reset_delta(&mut self) {
        self.delta = self.delta0;
    }

    fn relax(&mut self) {
        self.delta *= 2.;
        self.minstab *= 0.1;
    }

    fn tighten(&mut self) {
        self.delta = (self.delta / 2.).max(self.delta0);
        self.minstab = (self.minstab * 10.).min(MINSTAB);
    }
}

// ---------------------------------------------------------------------------
// ENTER-mode (primal) candidate scan, shared by the testers.
// ---------------------------------------------------------------------------

struct PrimalScan {
    /// Relaxed minimum step (pass 1).
    val1: E,
    /// Largest |update| over all candidates.
    moststable: E,
    any: bool,
}

fn primal_pass1(core: &Core, work: &IterWork, dir: E, delta: E, eps: E, cap: E) -> PrimalScan {
    let mut scan = PrimalScan {
        val1: cap,
        moststable: 0.,
        any: false,
    };
    for k in 0..work.alpha.len() {
        let slot = work.alpha.index_mem()[k];
        let u = -dir * work.alpha.value(slot);
        if u.abs() <= eps {
            continue;
        }
        let id = core.basis[slot];
        let v = core.fvec[slot];
        let mag = if u > 0. {
            if is_unbounded(core.wub[id]) {
                continue;
            }
            let y = core.wub[id] - v;
            if y <= 0. { delta / u } else { (y + delta) / u }
        } else {
            if is_unbounded(core.wlb[id]) {
                continue;
            }
            let y = core.wlb[id] - v;
            if y >= 0. { -delta / u } else { (y - delta) / u }
        };
        scan.any = true;
        scan.moststable = scan.moststable.max(u.abs());
        if mag < scan.val1 {
            scan.val1 = mag;
        }
    }
    scan
}

/// Pass 2: the most stable candidate whose strict step fits under `val1`.
fn primal_pass2(core: &Core, work: &IterWork, dir: E, eps: E, val1: E) -> Option<(I, E, E)> {
    let mut best: Option<(I, E, E)> = None;
    for k in 0..work.alpha.len() {
        let slot = work.alpha.index_mem()[k];
        let u = -dir * work.alpha.value(slot);
        if u.abs() <= eps {
            continue;
        }
        let id = core.basis[slot];
        let v = core.fvec[slot];
        let strict = if u > 0. {
            if is_unbounded(core.wub[id]) {
                continue;
            }
            (core.wub[id] - v) / u
        } else {
            if is_unbounded(core.wlb[id]) {
                continue;
            }
            (core.wlb[id] - v) / u
        };
        if strict > val1 {
            continue;
        }
        match best {
            Some((bslot, _, babs)) if u.abs() < babs || (u.abs() == babs && slot >= bslot) => {}
            _ => best = Some((slot, strict, u.abs())),
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Textbook
// ---------------------------------------------------------------------------

/// Textbook ratio test: minimum strict ratio, rejecting tiny updates. Not
/// meant for numerically hard LPs; it documents the contract the stabilized
/// testers refine.
#[derive(Debug, Clone)]
pub(crate) struct Textbook {
    tols: Tols,
}

impl Textbook {
    pub(crate) fn new() -> Self {
        Self { tols: Tols::new() }
    }
}

impl RatioTester for Textbook {
    fn reset(&mut self, feastol: E, epsilon: E) {
        self.tols.install(feastol, epsilon);
    }

    fn select_leave(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _enter_id: I,
        dir: E,
        val: &mut E,
    ) -> LeaveChoice {
        let eps = self.tols.epsilon.max(1e-12);
        let cap = *val;
        let mut best: Option<(I, E)> = None;
        for k in 0..work.alpha.len() {
            let slot = work.alpha.index_mem()[k];
            let u = -dir * work.alpha.value(slot);
            if u.abs() <= eps {
                continue;
            }
            let id = core.basis[slot];
            let v = core.fvec[slot];
            let strict = if u > 0. {
                if is_unbounded(core.wub[id]) {
                    continue;
                }
                (core.wub[id] - v) / u
            } else {
                if is_unbounded(core.wlb[id]) {
                    continue;
                }
                (core.wlb[id] - v) / u
            };
            let strict = strict.max(0.);
            match best {
                Some((bslot, bmag)) if strict > bmag || (strict == bmag && slot >= bslot) => {}
                _ => best = Some((slot, strict)),
            }
        }
        match best {
            Some((slot, mag)) if mag < cap => {
                *val = mag;
                LeaveChoice::Slot(slot)
            }
            _ => {
                if is_unbounded(cap) {
                    LeaveChoice::Unbounded
                } else {
                    LeaveChoice::Flip
                }
            }
        }
    }

    fn select_enter(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _leave_slot: I,
        val: &mut E,
    ) -> EnterChoice {
        let eps = self.tols.epsilon.max(1e-12);
        let sgn = if *val > 0. { 1. } else { -1. };
        let mut best: Option<(I, E, E)> = None;

        let mut consider = |id: I, x: E, value: E, low: E, up: E| {
            if x.abs() <= eps {
                return;
            }
            let u = sgn * x;
            let strict = if u > eps {
                if is_unbounded(up) {
                    return;
                }
                sgn * ((up - value) / x)
            } else if u < -eps {
                if is_unbounded(low) {
                    return;
                }
                sgn * ((low - value) / x)
            } else {
                return;
            };
            let strict = strict.max(0.);
            match best {
                Some((bid, bmag, _)) if strict > bmag || (strict == bmag && id >= bid) => {}
                _ => best = Some((id, strict, x)),
            }
        };

        for k in 0..work.zp.len() {
            let j = work.zp.index_mem()[k];
            if core.is_basic(j) {
                continue;
            }
            consider(j, work.zp.value(j), core.pval[j], core.pdlow[j], core.pdup[j]);
        }
        for k in 0..work.zc.len() {
            let i = work.zc.index_mem()[k];
            if core.is_basic(core.n + i) {
                continue;
            }
            consider(
                core.n + i,
                work.zc.value(i),
                core.y[i],
                core.cdlow[i],
                core.cdup[i],
            );
        }

        match best {
            Some((id, mag, _)) => {
                *val = sgn * mag;
                EnterChoice::Id(id)
            }
            None => EnterChoice::Infeasible,
        }
    }
}

// ---------------------------------------------------------------------------
// Harris and Fast
// ---------------------------------------------------------------------------

/// Harris two-pass ratio test: a tolerance-relaxed first pass bounds the
/// step, the second pass picks the most stable pivot under it.
#[derive(Debug, Clone)]
pub(crate) struct Harris {
    tols: Tols,
    relax_count: usize,
}

impl Harris {
    pub(crate) fn new() -> Self {
        Self {
            tols: Tols::new(),
            relax_count: 0,
        }
    }
}

/// Variant of Harris with a dynamic stability target; degenerate steps
/// shift the offending bound instead of accepting an unstable pivot.
#[derive(Debug, Clone)]
pub(crate) struct Fast {
    tols: Tols,
    relax_count: usize,
}

impl Fast {
    pub(crate) fn new() -> Self {
        Self {
            tols: Tols::new(),
            relax_count: 0,
        }
    }
}

fn two_pass_leave(
    tols: &mut Tols,
    relax_count: &mut usize,
    degenerate_shift: bool,
    core: &mut Core,
    work: &mut IterWork,
    dir: E,
    val: &mut E,
) -> LeaveChoice {
    let eps = tols.epsilon.max(1e-12);
    let cap = *val;
    loop {
        let scan = primal_pass1(core, work, dir, tols.delta, eps, cap);
        if !scan.any {
            *relax_count = 0;
            return if is_unbounded(cap) {
                LeaveChoice::Unbounded
            } else {
                LeaveChoice::Flip
            };
        }
        if !is_unbounded(cap) && cap <= scan.val1 {
            // The entering variable's own range binds within the relaxed
            // window; flipping it is the stable choice.
            *relax_count = 0;
            return LeaveChoice::Flip;
        }
        let stab = tols.minstab * scan.moststable;
        match primal_pass2(core, work, dir, eps, scan.val1) {
            Some((slot, strict, absu)) if absu >= stab => {
                *relax_count = 0;
                tols.tighten();
                let mut step = strict;
                if step < 0. {
                    step = 0.;
                    if degenerate_shift {
                        let id = core.basis[slot];
                        let u = -dir * work.alpha.value(slot);
                        let v = core.fvec[slot];
                        if u > 0. {
                            core.shift_wub(id, v);
                        } else {
                            core.shift_wlb(id, v);
                        }
                    }
                }
                *val = step;
                return LeaveChoice::Slot(slot);
            }
            _ => {
                if *relax_count < MAX_RELAX_COUNT {
                    tols.relax();
                    *relax_count += 1;
                    continue;
                }
                *relax_count = 0;
                return LeaveChoice::Unstable;
            }
        }
    }
}

struct DualCandidate {
    id: I,
    upd: E,
    strict: E,
}

fn dual_two_pass(
    tols: &mut Tols,
    relax_count: &mut usize,
    degenerate_shift: bool,
    core: &mut Core,
    work: &mut IterWork,
    val: &mut E,
) -> EnterChoice {
    let eps = tols.epsilon.max(1e-12);
    let sgn = if *val > 0. { 1. } else { -1. };
    loop {
        // Pass 1: relaxed minimum magnitude over both vector parts.
        let mut val1 = INFTY;
        let mut moststable: E = 0.;
        let mut any = false;
        {
            let mut scan = |x: E, value: E, low: E, up: E| {
                let u = sgn * x;
                if u > eps {
                    if is_unbounded(up) {
                        return;
                    }
                    let y = up - value;
                    let mag = if y <= 0. { tols.delta / u } else { (y + tols.delta) / u };
                    any = true;
                    moststable = moststable.max(x.abs());
                    val1 = val1.min(mag);
                } else if u < -eps {
                    if is_unbounded(low) {
                        return;
                    }
                    let y = low - value;
                    let mag = if y >= 0. { -tols.delta / u } else { (y - tols.delta) / u };
                    any = true;
                    moststable = moststable.max(x.abs());
                    val1 = val1.min(mag);
                }
            };
            for k in 0..work.zp.len() {
                let j = work.zp.index_mem()[k];
                if core.is_basic(j) {
                    continue;
                }
                scan(work.zp.value(j), core.pval[j], core.pdlow[j], core.pdup[j]);
            }
            for k in 0..work.zc.len() {
                let i = work.zc.index_mem()[k];
                if core.is_basic(core.n + i) {
                    continue;
                }
                scan(work.zc.value(i), core.y[i], core.cdlow[i], core.cdup[i]);
            }
        }
        if !any {
            *relax_count = 0;
            return EnterChoice::Infeasible;
        }

        // Pass 2: most stable candidate under the relaxed step.
        let mut best: Option<DualCandidate> = None;
        {
            let mut consider = |id: I, x: E, value: E, low: E, up: E| {
                let u = sgn * x;
                let strict_mag = if u > eps {
                    if is_unbounded(up) {
                        return;
                    }
                    sgn * ((up - value) / x)
                } else if u < -eps {
                    if is_unbounded(low) {
                        return;
                    }
                    sgn * ((low - value) / x)
                } else {
                    return;
                };
                if strict_mag > val1 {
                    return;
                }
                let replace = match best.as_ref() {
                    Some(b) => x.abs() > b.upd.abs() || (x.abs() == b.upd.abs() && id < b.id),
                    None => true,
                };
                if replace {
                    best = Some(DualCandidate {
                        id,
                        upd: x,
                        strict: strict_mag,
                    });
                }
            };
            for k in 0..work.zp.len() {
                let j = work.zp.index_mem()[k];
                if core.is_basic(j) {
                    continue;
                }
                consider(j, work.zp.value(j), core.pval[j], core.pdlow[j], core.pdup[j]);
            }
            for k in 0..work.zc.len() {
                let i = work.zc.index_mem()[k];
                if core.is_basic(core.n + i) {
                    continue;
                }
                consider(
                    core.n + i,
                    work.zc.value(i),
                    core.y[i],
                    core.cdlow[i],
                    core.cdup[i],
                );
            }
        }

        let stab = tols.minstab * moststable;
        match best {
            Some(cand) if cand.upd.abs() >= stab => {
                *relax_count = 0;
                tols.tighten();
                let mut mag = cand.strict;
                if mag < 0. {
                    mag = 0.;
                    if degenerate_shift {
                        shift_dual_to_value(core, cand.id, sgn * cand.upd > 0.);
                    }
                }
                *val = sgn * mag;
                return EnterChoice::Id(cand.id);
            }
            _ => {
                if *relax_count < MAX_RELAX_COUNT {
                    tols.relax();
                    *relax_count += 1;
                    continue;
                }
                *relax_count = 0;
                return EnterChoice::Unstable;
            }
        }
    }
}

/// Shifts the dual working bound a degenerate pivot would violate onto the
/// current value.
fn shift_dual_to_value(core: &mut Core, id: I, moving_up: bool) {
    if id < core.n {
        let v = core.pval[id];
        if moving_up {
            core.shift_pdup(id, v);
        } else {
            core.shift_pdlow(id, v);
        }
    } else {
        let i = id - core.n;
        let v = core.y[i];
        if moving_up {
            core.shift_cdup(i, v);
        } else {
            core.shift_cdlow(i, v);
        }
    }
}

impl RatioTester for Harris {
    fn reset(&mut self, feastol: E, epsilon: E) {
        self.tols.install(feastol, epsilon);
        self.relax_count = 0;
    }

    fn select_leave(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _enter_id: I,
        dir: E,
        val: &mut E,
    ) -> LeaveChoice {
        two_pass_leave(&mut self.tols, &mut self.relax_count, false, core, work, dir, val)
    }

    fn select_enter(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _leave_slot: I,
        val: &mut E,
    ) -> EnterChoice {
        dual_two_pass(&mut self.tols, &mut self.relax_count, false, core, work, val)
    }
}

impl RatioTester for Fast {
    fn reset(&mut self, feastol: E, epsilon: E) {
        self.tols.install(feastol, epsilon);
        self.relax_count = 0;
    }

    fn select_leave(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _enter_id: I,
        dir: E,
        val: &mut E,
    ) -> LeaveChoice {
        two_pass_leave(&mut self.tols, &mut self.relax_count, true, core, work, dir, val)
    }

    fn select_enter(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        _leave_slot: I,
        val: &mut E,
    ) -> EnterChoice {
        dual_two_pass(&mut self.tols, &mut self.relax_count, true, core, work, val)
    }
}

// ---------------------------------------------------------------------------
// Bound flipping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    PVec,
    CoPVec,
}

#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    idx: I,
    src: Source,
    val: E,
}

/// Bound-flipping ratio test for the leaving algorithm in COLUMN
/// representation; everywhere else it behaves like [`Fast`].
///
/// The long step walks the sorted breakpoints of the pivot row, flipping
/// boxed nonbasic variables across their ranges while the dual objective
/// keeps improving, and only then picks the pivot among the remaining
/// breakpoints by stability.
#[derive(Debug, Clone)]
pub(crate) struct BoundFlipping {
    fast: Fast,
    tols: Tols,
    relax_count: usize,
    breakpoints: Vec<Breakpoint>,
    flip_potential: E,
}

impl BoundFlipping {
    pub(crate) fn new() -> Self {
        Self {
            fast: Fast::new(),
            tols: Tols::new(),
            relax_count: 0,
            breakpoints: Vec::new(),
            flip_potential: 1.,
        }
    }

    fn collect(
        &mut self,
        nbp: &mut usize,
        min_idx: &mut usize,
        sgn: E,
        values: &[E],
        upd: &crate::linalg::ssvec::DeltaVector,
        low: &[E],
        up: &[E],
        src: Source,
    ) {
        let eps = self.tols.epsilon.max(1e-12);
        let delta = self.tols.delta;
        let mut min_val = if *nbp == 0 {
            INFTY
        } else {
            self.breakpoints[*min_idx].val
        };

        for k in 0..upd.len() {
            let i = upd.index_mem()[k];
            let x = upd.value(i);
            let u = sgn * x;
            let cur;
            if u > eps {
                if is_unbounded(up[i]) {
                    continue;
                }
                let y = up[i] - values[i];
                cur = if y <= 0. { delta / u } else { (y + delta) / u };
            } else if u < -eps {
                if is_unbounded(low[i]) {
                    continue;
                }
                let y = low[i] - values[i];
                cur = if y >= 0. { -delta / u } else { (y - delta) / u };
            } else {
                continue;
            }

            if *nbp >= self.breakpoints.len() {
                self.breakpoints
                    .resize((*nbp + 1) * 2, Breakpoint { idx: 0, src, val: 0. });
            }
            self.breakpoints[*nbp] = Breakpoint { idx: i, src, val: cur };
            if cur < min_val {
                min_val = cur;
                *min_idx = *nbp;
            }
            *nbp += 1;
        }
    }
}

impl RatioTester for BoundFlipping {
    fn reset(&mut self, feastol: E, epsilon: E) {
        self.tols.install(feastol, epsilon);
        self.fast.reset(feastol, epsilon);
        self.relax_count = 0;
        self.flip_potential = 1.;
    }

    fn select_leave(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        enter_id: I,
        dir: E,
        val: &mut E,
    ) -> LeaveChoice {
        self.fast.select_leave(core, work, enter_id, dir, val)
    }

    fn select_enter(
        &mut self,
        core: &mut Core,
        work: &mut IterWork,
        leave_slot: I,
        val: &mut E,
    ) -> EnterChoice {
        // Periodically reset the gate and try long steps again.
        if core.leave_count % LONGSTEP_FREQ == 0 {
            self.flip_potential = 1.;
        }
        if core.representation == Representation::Row || self.flip_potential < 0.01 {
            return self.fast.select_enter(core, work, leave_slot, val);
        }

        self.tols.reset_delta();
        let eps = self.tols.epsilon.max(1e-12);
        let max = *val;
        let sgn = if max > 0. { 1. } else { -1. };
        *val = 0.;

        // Collect breakpoints from both vector parts and remember the
        // minimum.
        let mut nbp = 0usize;
        let mut min_idx = 0usize;
        self.collect(
            &mut nbp,
            &mut min_idx,
            sgn,
            &core.pval,
            &work.zp,
            &core.pdlow,
            &core.pdup,
            Source::PVec,
        );
        self.collect(
            &mut nbp,
            &mut min_idx,
            sgn,
            &core.y,
            &work.zc,
            &core.cdlow,
            &core.cdup,
            Source::CoPVec,
        );
        if nbp == 0 {
            core.boundflips = 0;
            return EnterChoice::Infeasible;
        }

        // Bring the smallest breakpoint to the front so a no-flip outcome
        // skips the sorting phase entirely.
        self.breakpoints.swap(0, min_idx);

        // Walk breakpoints in ascending order while the dual objective
        // still improves, consuming the slope with every boxed range
        // crossed.
        let mut slope = core.ftest(leave_slot).abs();
        let mut moststable: E = 0.;
        let mut sorted = 0usize;
        let sortsize = 4usize;
        let mut usedbp = 0usize;
        while usedbp < nbp && slope > eps {
            if usedbp > sorted {
                sorted = qsort_part(&mut self.breakpoints[..nbp], sorted + 1, sortsize);
            }
            let bp = self.breakpoints[usedbp];
            match bp.src {
                Source::PVec => {
                    if core.is_basic(bp.idx) {
                        self.breakpoints[usedbp].idx = MARKED;
                        work.zp.clear_idx(bp.idx);
                    } else {
                        let absupd = work.zp.value(bp.idx).abs();
                        slope -= (core.wub[bp.idx] - core.wlb[bp.idx]) * absupd;
                        moststable = moststable.max(absupd);
                    }
                }
                Source::CoPVec => {
                    if core.is_basic(core.n + bp.idx) {
                        self.breakpoints[usedbp].idx = MARKED;
                        work.zc.clear_idx(bp.idx);
                    } else {
                        let absupd = work.zc.value(bp.idx).abs();
                        let id = core.n + bp.idx;
                        slope -= (core.wub[id] - core.wlb[id]) * absupd;
                        moststable = moststable.max(absupd);
                    }
                }
            }
            usedbp += 1;
        }
        usedbp -= 1;

        // Slope never exhausted: the dual is unbounded along this row.
        if slope > 0. && usedbp >= nbp - 1 {
            core.boundflips = 0;
            return EnterChoice::Infeasible;
        }

        // A long step must actually gain something; otherwise use the
        // single smallest breakpoint, skipping marked basics.
        if self.breakpoints[usedbp].val.abs() - self.breakpoints[0].val.abs() < MIN_LONGSTEP
            && self.breakpoints[0].val.abs() > eps
        {
            usedbp = 0;
            while usedbp < nbp - 1 && self.breakpoints[usedbp].idx == MARKED {
                usedbp += 1;
            }
        }

        // Scan pivot candidates from the back for the first stable one.
        let degeneps = self.tols.delta / moststable.max(eps);
        let stab = LOWSTAB.max(self.tols.minstab) * moststable;
        let mut enter: Option<I> = None;
        let mut scan = usedbp as i64;
        while scan >= 0 {
            let bp = self.breakpoints[scan as usize];
            if bp.idx == MARKED {
                scan -= 1;
                continue;
            }
            match bp.src {
                Source::PVec => {
                    let j = bp.idx;
                    // Refresh the pricing value before using it for the
                    // final step length.
                    core.pval[j] = var_col_dot(&core.mat, core.n, j, &core.y);
                    let x = work.zp.value(j);
                    if x.abs() < stab {
                        scan -= 1;
                        continue;
                    }
                    let target = if sgn * x > 0. { core.pdup[j] } else { core.pdlow[j] };
                    let mut v = (target - core.pval[j]) / x;
                    if core.pdup[j] == core.pdlow[j] {
                        v = 0.;
                        let pv = core.pval[j];
                        core.shift_pdup(j, pv);
                        core.shift_pdlow(j, pv);
                    } else if sgn * v < -degeneps {
                        v = 0.;
                        if sgn * x > 0. {
                            core.shift_pdup(j, core.pval[j]);
                        } else {
                            core.shift_pdlow(j, core.pval[j]);
                        }
                    }
                    enter = Some(j);
                    *val = v;
                }
                Source::CoPVec => {
                    let i = bp.idx;
                    let x = work.zc.value(i);
                    if x.abs() < stab {
                        scan -= 1;
                        continue;
                    }
                    let target = if sgn * x > 0. { core.cdup[i] } else { core.cdlow[i] };
                    let mut v = (target - core.y[i]) / x;
                    if core.cdup[i] == core.cdlow[i] {
                        v = 0.;
                        let yv = core.y[i];
                        core.shift_cdup(i, yv);
                        core.shift_cdlow(i, yv);
                    } else if sgn * v < -degeneps {
                        v = 0.;
                        if sgn * x > 0. {
                            core.shift_cdup(i, core.y[i]);
                        } else {
                            core.shift_cdlow(i, core.y[i]);
                        }
                    }
                    enter = Some(core.n + i);
                    *val = v;
                }
            }
            break;
        }

        let enter = match enter {
            Some(id) => {
                self.relax_count = 0;
                self.tols.tighten();
                id
            }
            None => {
                if self.relax_count < MAX_RELAX_COUNT {
                    self.tols.relax();
                    self.relax_count += 1;
                    *val = max;
                    return self.select_enter(core, work, leave_slot, val);
                }
                core.boundflips = 0;
                return EnterChoice::Unstable;
            }
        };

        // Flip everything strictly before the chosen pivot.
        let chosen_pos = scan as usize;
        let mut flips = 0usize;
        if chosen_pos > 0 {
            for k in 0..chosen_pos {
                let bp = self.breakpoints[k];
                if bp.idx == MARKED {
                    continue;
                }
                let id = match bp.src {
                    Source::PVec => bp.idx,
                    Source::CoPVec => core.n + bp.idx,
                };
                if core.flip(id) {
                    flips += 1;
                }
            }
        }
        core.boundflips = flips;

        // Estimate whether long steps stay worthwhile.
        self.flip_potential *= flips as E + 0.95;

        EnterChoice::Id(enter)
    }
}

/// Partially sorts `arr[start..]` ascending by breakpoint value so that at
/// least `size` further elements are in final position; returns the index of
/// the last sorted element. Elements before `start` must already be the
/// smallest, in order.
fn qsort_part(arr: &mut [Breakpoint], start: usize, size: usize) -> usize {
    let end = arr.len();
    let target = (start + size).min(end);
    qsort_bounded(arr, start, end, target);
    target.saturating_sub(1)
}

fn qsort_bounded(arr: &mut [Breakpoint], lo: usize, hi: usize, target: usize) {
    if lo >= target || hi <= lo + 1 {
        return;
    }
    if hi - lo <= 12 {
        arr[lo..hi].sort_unstable_by(|a, b| a.val.partial_cmp(&b.val).unwrap());
        return;
    }
    let p = partition(arr, lo, hi);
    qsort_bounded(arr, lo, p, target);
    qsort_bounded(arr, p + 1, hi, target);
}

fn partition(arr: &mut [Breakpoint], lo: usize, hi: usize) -> usize {
    let mid = lo + (hi - lo) / 2;
    // Median-of-three pivot, moved to the end.
    if arr[mid].val < arr[lo].val {
        arr.swap(mid, lo);
    }
    if arr[hi - 1].val < arr[lo].val {
        arr.swap(hi - 1, lo);
    }
    if arr[hi - 1].val < arr[mid].val {
        arr.swap(hi - 1, mid);
    }
    arr.swap(mid, hi - 1);
    let pivot = arr[hi - 1].val;
    let mut store = lo;
    for k in lo..hi - 1 {
        if arr[k].val < pivot {
            arr.swap(k, store);
            store += 1;
        }
    }
    arr.swap(store, hi - 1);
    store
}

// ---------------------------------------------------------------------------
// Strategy enum
// ---------------------------------------------------------------------------

/// The configured ratio-test strategies.
#[enum_dispatch(RatioTester)]
pub(crate) enum RatioTesters {
    Textbook(Textbook),
    Harris(Harris),
    Fast(Fast),
    BoundFlipping(BoundFlipping),
}

impl RatioTesters {
    pub(crate) fn from_selection(selection: RatioTesterSelection) -> Self {
        match selection {
            RatioTesterSelection::Textbook => RatioTesters::Textbook(Textbook::new()),
            RatioTesterSelection::Harris => RatioTesters::Harris(Harris::new()),
            RatioTesterSelection::Fast => RatioTesters::Fast(Fast::new()),
            RatioTesterSelection::BoundFlipping => RatioTesters::BoundFlipping(BoundFlipping::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(val: E) -> Breakpoint {
        Breakpoint {
            idx: 0,
            src: Source::PVec,
            val,
        }
    }

    #[test]
    fn test_partial_sort_prefix() {
        let mut arr: Vec<Breakpoint> = [9., 3., 7., 1., 8., 2., 6., 4., 5., 0., 11., 10.]
            .iter()
            .map(|&v| bp(v))
            .collect();
        // Position 0 plays the role of the pre-placed minimum.
        arr.swap(0, 9);
        let sorted = qsort_part(&mut arr, 1, 4);
        assert!(sorted >= 4);
        // The prefix is ascending and dominates the unsorted tail.
        for k in 1..=sorted {
            assert!(arr[k - 1].val <= arr[k].val);
        }
        let prefix_max = arr[sorted].val;
        for later in &arr[sorted + 1..] {
            assert!(prefix_max <= later.val);
        }
    }
}
