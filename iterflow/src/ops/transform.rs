//! Per-element callback operators.

use crate::core::IterationState;
use crate::errors::FlowError;
use crate::stages::{Directive, Feed, Kernel, KernelOperator};
use std::sync::Arc;

/// `None` drops the element.
type Outcome<U> = Option<Result<U, FlowError>>;

/// Runs a callback per element with a stage-owned state container.
struct StepKernel<F> {
    step: F,
    index: usize,
    state: IterationState,
}

impl<F> StepKernel<F> {
    fn new(step: F) -> Self {
        Self {
            step,
            index: 0,
            state: IterationState::new(),
        }
    }
}

impl<T, U, F> Kernel<T, U> for StepKernel<F>
where
    F: FnMut(T, usize, &mut IterationState) -> Outcome<U> + Send,
{
    fn resume(&mut self, feed: Feed<T>) -> Directive<U> {
        match feed {
            Feed::Resume => Directive::Pull,
            Feed::Item(value) => {
                let index = self.index;
                self.index += 1;
                match (self.step)(value, index, &mut self.state) {
                    Some(Ok(value)) => Directive::Emit(value),
                    Some(Err(error)) => Directive::Fail(error),
                    None => Directive::Pull,
                }
            }
            Feed::Error(error) => {
                self.index += 1;
                Directive::Fail(error)
            }
            Feed::End => Directive::Done,
        }
    }
}

/// Transforms every element.
pub fn map<T, U, F>(f: F) -> KernelOperator<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T, usize, &mut IterationState) -> U + Send + Sync + 'static,
{
    let f = Arc::new(f);
    KernelOperator::new("map", move || {
        let f = Arc::clone(&f);
        StepKernel::new(move |value: T, index: usize, state: &mut IterationState| -> Outcome<U> {
            Some(Ok(f(value, index, state)))
        })
    })
}

/// Transforms every element with a fallible callback.
///
/// A callback error fails that element only; the stage keeps going.
pub fn try_map<T, U, F>(f: F) -> KernelOperator<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T, usize, &mut IterationState) -> Result<U, FlowError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    KernelOperator::new("try_map", move || {
        let f = Arc::clone(&f);
        StepKernel::new(move |value: T, index: usize, state: &mut IterationState| -> Outcome<U> {
            Some(f(value, index, state))
        })
    })
}

/// Keeps the elements the predicate accepts.
pub fn filter<T, F>(predicate: F) -> KernelOperator<T, T>
where
    T: Send + 'static,
    F: Fn(&T, usize, &mut IterationState) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    KernelOperator::new("filter", move || {
        let predicate = Arc::clone(&predicate);
        StepKernel::new(move |value: T, index: usize, state: &mut IterationState| -> Outcome<T> {
            predicate(&value, index, state).then_some(Ok(value))
        })
    })
}

/// Observes every element without changing it.
pub fn tap<T, F>(f: F) -> KernelOperator<T, T>
where
    T: Send + 'static,
    F: Fn(&T, usize, &mut IterationState) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    KernelOperator::new("tap", move || {
        let f = Arc::clone(&f);
        StepKernel::new(move |value: T, index: usize, state: &mut IterationState| -> Outcome<T> {
            f(&value, index, state);
            Some(Ok(value))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::source::Source;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RunningTotal(i32);

    #[test]
    fn test_map_receives_index() {
        let output = Pipeline::from_items(vec![10, 20, 30])
            .pipe(map(|value: i32, index, _state| value + index as i32))
            .collect_sync()
            .unwrap();
        assert_eq!(output, vec![10, 21, 32]);
    }

    #[test]
    fn test_state_container_persists_across_elements() {
        let output = Pipeline::from_items(vec![1, 2, 3, 4])
            .pipe(map(|value: i32, _index, state: &mut IterationState| {
                let total = state.get_or_default::<RunningTotal>();
                total.0 += value;
                total.0
            }))
            .collect_sync()
            .unwrap();
        assert_eq!(output, vec![1, 3, 6, 10]);
    }

    #[test]
    fn test_state_container_is_fresh_per_pass() {
        let pipeline = Pipeline::from_items(vec![1, 1]).pipe(map(
            |value: i32, _index, state: &mut IterationState| {
                let total = state.get_or_default::<RunningTotal>();
                total.0 += value;
                total.0
            },
        ));
        assert_eq!(pipeline.collect_sync().unwrap(), vec![1, 2]);
        assert_eq!(pipeline.collect_sync().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_filter_and_tap() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let output = Pipeline::from_items(1..=6)
            .pipe(filter(|value: &i32, _, _| value % 2 == 0))
            .pipe(tap(move |value: &i32, index, _| seen_clone.lock().push((*value, index))))
            .collect_sync()
            .unwrap();

        assert_eq!(output, vec![2, 4, 6]);
        assert_eq!(*seen.lock(), vec![(2, 0), (4, 1), (6, 2)]);
    }

    #[test]
    fn test_try_map_failure_is_per_element() {
        let mut cursor = Pipeline::new(Source::from(vec![1, 2, 3]))
            .pipe(try_map(|value: i32, _, _| {
                if value == 2 {
                    Err(FlowError::msg("two"))
                } else {
                    Ok(value)
                }
            }))
            .iter();

        assert_eq!(cursor.next().unwrap().unwrap(), 1);
        assert_eq!(cursor.next().unwrap().unwrap_err().to_string(), "two");
        // The pipeline boundary treats an unrecovered failure as terminal.
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_map_is_mode_transparent() {
        let output = Pipeline::new(Source::stream_with(|| futures::stream::iter(vec![1, 2])))
            .pipe(map(|value: i32, _, _| value * 100))
            .collect_async()
            .await
            .unwrap();
        assert_eq!(output, vec![100, 200]);
    }
}
