use crate::errors::{LseError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification state of a candidate point during a selection run.
///
/// Transitions are monotone: a point leaves `Undetermined` once, either by being
/// activated or by being classified on one side of the level, and never comes back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum ClassificationState {
    /// Still a candidate for selection
    #[default]
    Undetermined,
    /// Selected into the active set
    Active,
    /// Confidently above the level
    ClassifiedAbove,
    /// Confidently below the level
    ClassifiedBelow,
}

impl ClassificationState {
    /// True when the point is classified on one side of the level
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            ClassificationState::ClassifiedAbove | ClassificationState::ClassifiedBelow
        )
    }
}

impl fmt::Display for ClassificationState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ClassificationState::Undetermined => "undetermined",
            ClassificationState::Active => "active",
            ClassificationState::ClassifiedAbove => "classified-above",
            ClassificationState::ClassifiedBelow => "classified-below",
        };
        write!(f, "{s}")
    }
}

/// The whole set of candidate points (inputs and targets) with their classification states.
///
/// Inputs and targets are immutable once loaded, only states evolve.
#[derive(Clone, Debug)]
pub struct CandidatePool<F: Float> {
    inputs: Array2<F>,
    targets: Array1<F>,
    states: Vec<ClassificationState>,
}

impl<F: Float> CandidatePool<F> {
    /// Constructor given (n, dim) inputs and (n,) targets
    pub fn new(
        inputs: &ArrayBase<impl Data<Elem = F>, Ix2>,
        targets: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        if inputs.nrows() != targets.len() {
            return Err(LseError::DimensionError {
                expected: inputs.nrows(),
                actual: targets.len(),
            });
        }
        if inputs.nrows() == 0 || inputs.ncols() == 0 {
            return Err(LseError::InvalidValueError(format!(
                "Candidate pool should not be empty, got inputs of shape {:?}",
                inputs.dim()
            )));
        }
        Ok(CandidatePool {
            inputs: inputs.to_owned(),
            targets: targets.to_owned(),
            states: vec![ClassificationState::Undetermined; inputs.nrows()],
        })
    }

    /// Number of candidate points
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false as an empty pool cannot be built
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Input dimension
    pub fn dim(&self) -> usize {
        self.inputs.ncols()
    }

    /// All inputs as a (n, dim) matrix
    pub fn inputs(&self) -> ArrayView2<F> {
        self.inputs.view()
    }

    /// All targets
    pub fn targets(&self) -> ArrayView1<F> {
        self.targets.view()
    }

    /// Input of the given point
    pub fn input(&self, index: usize) -> Result<ArrayView1<F>> {
        self.check_index(index)?;
        Ok(self.inputs.row(index))
    }

    /// Target of the given point
    pub fn target(&self, index: usize) -> Result<F> {
        self.check_index(index)?;
        Ok(self.targets[index])
    }

    /// State of the given point
    pub fn state(&self, index: usize) -> Result<ClassificationState> {
        self.check_index(index)?;
        Ok(self.states[index])
    }

    /// States of all points
    pub fn states(&self) -> &[ClassificationState] {
        &self.states
    }

    /// Number of points in the given state
    pub fn count(&self, state: ClassificationState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }

    /// Mark the point as part of the active set.
    ///
    /// Fails if the point is already active or already classified.
    pub fn activate(&mut self, index: usize) -> Result<()> {
        match self.state(index)? {
            ClassificationState::Undetermined => {
                self.states[index] = ClassificationState::Active;
                Ok(())
            }
            ClassificationState::Active => Err(LseError::AlreadyActiveError(index)),
            state => Err(LseError::ClassificationError(format!(
                "point {index} is {state} and cannot be activated"
            ))),
        }
    }

    /// Classify an undetermined point above or below the level.
    pub fn classify(&mut self, index: usize, state: ClassificationState) -> Result<()> {
        if !state.is_classified() {
            return Err(LseError::InvalidValueError(format!(
                "`{state}` is not a classification outcome"
            )));
        }
        match self.state(index)? {
            ClassificationState::Undetermined => {
                self.states[index] = state;
                Ok(())
            }
            current => Err(LseError::ClassificationError(format!(
                "point {index} is {current} and cannot become {state}"
            ))),
        }
    }

    /// Lazy sequence of the undetermined point indices in increasing order.
    ///
    /// Calling it again restarts from the first index and reflects the current states.
    pub fn candidate_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ClassificationState::Undetermined)
            .map(|(i, _)| i)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            Err(LseError::IndexOutOfRangeError {
                index,
                size: self.len(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn pool() -> CandidatePool<f64> {
        CandidatePool::new(&array![[0.], [1.], [2.], [3.]], &array![-1., -1., 1., 1.])
            .expect("pool")
    }

    #[test]
    fn test_activate_twice_fails() {
        let mut pool = pool();
        pool.activate(2).expect("activation");
        assert!(matches!(pool.activate(2), Err(LseError::AlreadyActiveError(2))));
        assert_eq!(ClassificationState::Active, pool.state(2).unwrap());
    }

    #[test]
    fn test_out_of_range() {
        let mut pool = pool();
        assert!(matches!(
            pool.activate(4),
            Err(LseError::IndexOutOfRangeError { index: 4, size: 4 })
        ));
    }

    #[test]
    fn test_candidate_indices_restart_and_skip_resolved() {
        let mut pool = pool();
        let mut it = pool.candidate_indices();
        assert_eq!(Some(0), it.next());
        assert_eq!(Some(1), it.next());
        drop(it);
        pool.activate(1).unwrap();
        pool.classify(3, ClassificationState::ClassifiedAbove).unwrap();
        assert_eq!(vec![0, 2], pool.candidate_indices().collect::<Vec<_>>());
        assert_eq!(1, pool.count(ClassificationState::Active));
    }

    #[test]
    fn test_classification_is_monotone() {
        let mut pool = pool();
        pool.classify(0, ClassificationState::ClassifiedBelow).unwrap();
        assert!(pool.classify(0, ClassificationState::ClassifiedAbove).is_err());
        assert!(pool.activate(0).is_err());
        assert!(pool.classify(1, ClassificationState::Undetermined).is_err());
        pool.activate(1).unwrap();
        assert!(pool.classify(1, ClassificationState::ClassifiedBelow).is_err());
    }

    #[test]
    fn test_bad_shapes() {
        let res = CandidatePool::new(&array![[0.], [1.]], &array![1.]);
        assert!(matches!(res, Err(LseError::DimensionError { .. })));
        let res = CandidatePool::<f64>::new(&Array2::zeros((0, 2)), &Array1::zeros(0));
        assert!(matches!(res, Err(LseError::InvalidValueError(_))));
    }
}
