//! Interceptor middleware.
//!
//! Interceptors wrap two extension points of the command handler:
//! preparing a command and executing it. Each hook receives an
//! [`Invocation`] and continues the chain with [`Invocation::proceed`].
//! Not calling `proceed` replaces the call entirely.
//!
//! ```ignore
//! #[derive(Debug)]
//! struct Tagging;
//!
//! impl Interceptor for Tagging {
//!     fn on_prepare(&self, mut invocation: Invocation<'_, ()>) -> MapperResult<()> {
//!         invocation.command_mut().sql.push_str(" /* tagged */");
//!         invocation.proceed()
//!     }
//! }
//! ```

use crate::driver::{PreparedCommand, ResultSet, UpdateOutcome};
use crate::error::{MapperError, MapperResult};
use std::fmt;
use std::sync::Arc;

/// Which extension point an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionPoint {
    Prepare,
    Execute,
}

/// Outcome of running a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Query(ResultSet),
    Update(UpdateOutcome),
}

impl Execution {
    pub fn into_result_set(self) -> MapperResult<ResultSet> {
        match self {
            Self::Query(rs) => Ok(rs),
            Self::Update(_) => Err(MapperError::internal(
                "Interceptor returned an update outcome for a query",
            )),
        }
    }

    pub fn into_update_outcome(self) -> MapperResult<UpdateOutcome> {
        match self {
            Self::Update(outcome) => Ok(outcome),
            Self::Query(_) => Err(MapperError::internal(
                "Interceptor returned a result set for an update",
            )),
        }
    }
}

pub trait Interceptor: Send + Sync + fmt::Debug {
    fn on_prepare(&self, invocation: Invocation<'_, ()>) -> MapperResult<()> {
        invocation.proceed()
    }

    fn on_execute(&self, invocation: Invocation<'_, Execution>) -> MapperResult<Execution> {
        invocation.proceed()
    }
}

/// Routes an invocation to the hook matching its result type.
pub trait InterceptedResult: Sized {
    fn dispatch(interceptor: &dyn Interceptor, invocation: Invocation<'_, Self>) -> MapperResult<Self>;
}

impl InterceptedResult for () {
    fn dispatch(interceptor: &dyn Interceptor, invocation: Invocation<'_, Self>) -> MapperResult<Self> {
        interceptor.on_prepare(invocation)
    }
}

impl InterceptedResult for Execution {
    fn dispatch(interceptor: &dyn Interceptor, invocation: Invocation<'_, Self>) -> MapperResult<Self> {
        interceptor.on_execute(invocation)
    }
}

/// One pending call through the rest of the chain.
pub struct Invocation<'a, T> {
    point: InterceptionPoint,
    statement_id: &'a str,
    command: &'a mut PreparedCommand,
    remaining: &'a [Arc<dyn Interceptor>],
    target: &'a mut dyn FnMut(&mut PreparedCommand) -> MapperResult<T>,
}

impl<'a, T: InterceptedResult> Invocation<'a, T> {
    pub fn point(&self) -> InterceptionPoint {
        self.point
    }

    pub fn statement_id(&self) -> &str {
        self.statement_id
    }

    pub fn command(&self) -> &PreparedCommand {
        self.command
    }

    pub fn command_mut(&mut self) -> &mut PreparedCommand {
        self.command
    }

    /// Call the next interceptor, or the target once the chain is exhausted.
    pub fn proceed(self) -> MapperResult<T> {
        let remaining = self.remaining;
        match remaining.split_first() {
            Some((next, rest)) => T::dispatch(
                next.as_ref(),
                Invocation {
                    remaining: rest,
                    ..self
                },
            ),
            None => (self.target)(self.command),
        }
    }
}

/// Registered interceptors, outermost first.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `target` for `command` through every interceptor.
    pub fn run<T: InterceptedResult>(
        &self,
        point: InterceptionPoint,
        statement_id: &str,
        command: &mut PreparedCommand,
        mut target: impl FnMut(&mut PreparedCommand) -> MapperResult<T>,
    ) -> MapperResult<T> {
        Invocation {
            point,
            statement_id,
            command,
            remaining: &self.interceptors,
            target: &mut target,
        }
        .proceed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recorder {
        fn on_prepare(&self, mut invocation: Invocation<'_, ()>) -> MapperResult<()> {
            self.log.lock().push(format!("{}:before", self.name));
            invocation.command_mut().sql.push_str(&format!(" /*{}*/", self.name));
            let result = invocation.proceed();
            self.log.lock().push(format!("{}:after", self.name));
            result
        }
    }

    #[derive(Debug)]
    struct ShortCircuit;

    impl Interceptor for ShortCircuit {
        fn on_execute(&self, _invocation: Invocation<'_, Execution>) -> MapperResult<Execution> {
            Ok(Execution::Query(ResultSet::single_column("n", [Value::Int(99)])))
        }
    }

    #[test]
    fn test_chain_order_and_command_rewrite() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.add(Arc::new(Recorder { name: "outer", log: log.clone() }));
        chain.add(Arc::new(Recorder { name: "inner", log: log.clone() }));

        let mut command = PreparedCommand::new("select 1");
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_target = seen.clone();
        chain
            .run(InterceptionPoint::Prepare, "ns.q", &mut command, |cmd| {
                *seen_in_target.lock() = cmd.sql.clone();
                log.lock().push("target".into());
                Ok(())
            })
            .unwrap();

        assert_eq!(*seen.lock(), "select 1 /*outer*/ /*inner*/");
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "target", "inner:after", "outer:after"]
        );
    }

    #[test]
    fn test_interceptor_can_replace_call() {
        let mut chain = InterceptorChain::new();
        chain.add(Arc::new(ShortCircuit));
        let mut command = PreparedCommand::new("select 1");
        let mut called = false;
        let result = chain
            .run(InterceptionPoint::Execute, "ns.q", &mut command, |_| {
                called = true;
                Ok(Execution::Query(ResultSet::default()))
            })
            .unwrap();
        assert!(!called);
        assert_eq!(result.into_result_set().unwrap().rows, vec![vec![Value::Int(99)]]);
    }

    #[test]
    fn test_empty_chain_calls_target() {
        let chain = InterceptorChain::new();
        let mut command = PreparedCommand::new("update t set a = 1");
        let outcome = chain
            .run(InterceptionPoint::Execute, "ns.u", &mut command, |_| {
                Ok(Execution::Update(UpdateOutcome {
                    rows_affected: 3,
                    ..Default::default()
                }))
            })
            .unwrap();
        assert_eq!(outcome.into_update_outcome().unwrap().rows_affected, 3);
    }
}
