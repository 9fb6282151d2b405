//! State paths through a model, with optional posterior annotation.

/// States a path can visit. `S`/`T` bracket the path; `N`/`C`/`J` emit on
/// loop transitions; `M`/`I` emit one residue; `D`/`B`/`E` are mute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    S,
    N,
    B,
    M,
    I,
    D,
    E,
    J,
    C,
    T,
}

/// One step of a path: the state, the model node (`k`, 0 for non-core
/// states), and the 1-based target position (`i`, 0 when nothing is
/// emitted at this step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStep {
    pub state: TraceState,
    pub k: usize,
    pub i: usize,
}

/// A complete state path for one sequence against one model.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Parent model size.
    pub m: usize,
    /// Target sequence length.
    pub l: usize,
    pub steps: Vec<TraceStep>,
    /// Per-step posterior probabilities, parallel to `steps`; only emitting
    /// steps carry meaningful mass.
    pub posteriors: Option<Vec<f32>>,
}

impl Trace {
    pub fn new(m: usize, l: usize) -> Self {
        Trace { m, l, steps: Vec::new(), posteriors: None }
    }

    /// Path length: the number of states visited.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, state: TraceState, k: usize, i: usize) {
        self.steps.push(TraceStep { state, k, i });
    }

    /// Residues emitted by match or insert states.
    pub fn emitted_residues(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.state, TraceState::M | TraceState::I))
            .count()
    }

    /// Sum of posterior probabilities over match/insert emissions divided by
    /// the emitted residue count; 0 without posterior annotation.
    pub fn expected_accuracy(&self) -> f32 {
        let pp = match &self.posteriors {
            Some(pp) => pp,
            None => return 0.0,
        };
        let mut mass = 0.0f32;
        let mut emitted = 0usize;
        for (step, &p) in self.steps.iter().zip(pp) {
            if matches!(step.state, TraceState::M | TraceState::I) {
                mass += p;
                emitted += 1;
            }
        }
        if emitted == 0 {
            0.0
        } else {
            mass / emitted as f32
        }
    }

    /// First and last model nodes visited by a match state, if any.
    pub fn model_span(&self) -> Option<(usize, usize)> {
        let mut span: Option<(usize, usize)> = None;
        for step in &self.steps {
            if step.state == TraceState::M {
                span = Some(match span {
                    None => (step.k, step.k),
                    Some((from, _)) => (from, step.k),
                });
            }
        }
        span
    }

    /// First and last target positions emitted by a match state, if any.
    pub fn target_span(&self) -> Option<(usize, usize)> {
        let mut span: Option<(usize, usize)> = None;
        for step in &self.steps {
            if step.state == TraceState::M {
                span = Some(match span {
                    None => (step.i, step.i),
                    Some((from, _)) => (from, step.i),
                });
            }
        }
        span
    }
}

/// A batch of traces sharing one model.
#[derive(Debug, Clone, Default)]
pub struct Traces(pub Vec<Trace>);

impl Traces {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Traces {
    type Output = Trace;
    fn index(&self, i: usize) -> &Trace {
        &self.0[i]
    }
}
