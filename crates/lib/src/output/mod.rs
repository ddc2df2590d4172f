//! Asynchronously resolved values.
//!
//! An [`Output`] is a single-assignment cell that settles into one of three
//! states: a known value, an unknown value (during a dry-run preview), or a
//! failure. Outputs are cheap to clone; every clone observes the same cell.
//!
//! Besides its eventual value, each output carries two pieces of metadata
//! that are known at construction time:
//!
//! - a secrecy flag, which every derived output inherits
//! - the set of resources the value originates from, which the graph builder
//!   reads to discover implicit dependency edges
//!
//! Derived outputs (`map`, `apply`, `all`, ...) are lazy: the combinator
//! closure runs at most once, the first time the derived output is resolved.

mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, Either, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{OnceCell, watch};

use crate::resource::ResourceId;
use crate::value::Value;

pub use error::OutputError;

/// Bound for values that can live in an output.
pub trait OutputValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> OutputValue for T {}

/// Observable state of an output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputState<T> {
  /// Not settled yet.
  Pending,
  /// Settled with a value.
  Known(T),
  /// Settled, but the value will only exist after a real apply.
  Unknown,
  /// Settled with a failure.
  Failed(OutputError),
}

/// Settled cell contents. `Ok(None)` is the unknown value.
#[derive(Clone)]
struct Settled<T> {
  value: Result<Option<T>, OutputError>,
  secret: bool,
}

impl<T> Settled<T> {
  fn failed(err: OutputError, secret: bool) -> Self {
    Self {
      value: Err(err),
      secret,
    }
  }
}

type Thunk<T> = Box<dyn Fn() -> BoxFuture<'static, Settled<T>> + Send + Sync>;

struct Inner<T> {
  cell: OnceCell<Settled<T>>,
  thunk: Option<Thunk<T>>,
  secret: bool,
  dependencies: BTreeSet<ResourceId>,
}

/// An asynchronously resolved value.
pub struct Output<T> {
  inner: Arc<Inner<T>>,
}

impl<T> Clone for Output<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: OutputValue> Output<T> {
  fn settled(value: Result<Option<T>, OutputError>, secret: bool, dependencies: BTreeSet<ResourceId>) -> Self {
    Self {
      inner: Arc::new(Inner {
        cell: OnceCell::new_with(Some(Settled { value, secret })),
        thunk: None,
        secret,
        dependencies,
      }),
    }
  }

  fn derived<F>(secret: bool, dependencies: BTreeSet<ResourceId>, thunk: F) -> Self
  where
    F: Fn() -> BoxFuture<'static, Settled<T>> + Send + Sync + 'static,
  {
    Self {
      inner: Arc::new(Inner {
        cell: OnceCell::new(),
        thunk: Some(Box::new(thunk)),
        secret,
        dependencies,
      }),
    }
  }

  /// An output that is already resolved to `value`.
  pub fn new(value: T) -> Self {
    Self::settled(Ok(Some(value)), false, BTreeSet::new())
  }

  /// An already resolved output whose value must not be displayed.
  pub fn secret(value: T) -> Self {
    Self::settled(Ok(Some(value)), true, BTreeSet::new())
  }

  /// An output whose value is not known until a real apply.
  pub fn unknown() -> Self {
    Self::settled(Ok(None), false, BTreeSet::new())
  }

  /// An output that has already failed with `err`.
  pub fn failed(err: OutputError) -> Self {
    Self::settled(Err(err), false, BTreeSet::new())
  }

  /// Create an unsettled output and the sender that settles it.
  ///
  /// `origin` is recorded as the output's dependency, so anything derived
  /// from it gains an edge to that resource.
  pub fn deferred(origin: Option<ResourceId>, secret: bool) -> (Self, OutputSender<T>) {
    let (tx, rx) = watch::channel(None::<Settled<T>>);

    let output = Self::derived(secret, origin.into_iter().collect(), move || {
      let mut rx = rx.clone();
      async move {
        let settled = match rx.wait_for(Option::is_some).await {
          Ok(slot) => slot.clone(),
          Err(_) => None,
        };
        settled.unwrap_or_else(|| Settled::failed(OutputError::Abandoned, secret))
      }
      .boxed()
    });

    (output, OutputSender { tx, secret })
  }

  /// Whether this output, or anything it was derived from, is secret.
  pub fn is_secret(&self) -> bool {
    self.inner.secret || self.inner.cell.get().is_some_and(|s| s.secret)
  }

  /// Resources this value originates from.
  pub fn dependencies(&self) -> &BTreeSet<ResourceId> {
    &self.inner.dependencies
  }

  /// Peek at the current state without waiting.
  pub fn state(&self) -> OutputState<T> {
    match self.inner.cell.get() {
      None => OutputState::Pending,
      Some(settled) => match &settled.value {
        Ok(Some(value)) => OutputState::Known(value.clone()),
        Ok(None) => OutputState::Unknown,
        Err(err) => OutputState::Failed(err.clone()),
      },
    }
  }

  /// Wait for the output to settle.
  ///
  /// Returns `Ok(None)` when the value is unknown.
  pub async fn resolve(&self) -> Result<Option<T>, OutputError> {
    self.settle().await.value
  }

  async fn settle(&self) -> Settled<T> {
    let settled = self
      .inner
      .cell
      .get_or_init(|| async {
        match &self.inner.thunk {
          Some(thunk) => thunk().await,
          None => Settled::failed(OutputError::Abandoned, self.inner.secret),
        }
      })
      .await;

    let mut settled = settled.clone();
    settled.secret |= self.inner.secret;
    settled
  }

  /// Transform the resolved value.
  ///
  /// `f` is never invoked for unknown or failed inputs; those states pass
  /// through unchanged.
  pub fn map<U, F>(&self, f: F) -> Output<U>
  where
    U: OutputValue,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    self.try_map(move |value| Ok(f(value)))
  }

  /// Like [`map`](Self::map), but `f` may fail the derived output.
  pub fn try_map<U, F>(&self, f: F) -> Output<U>
  where
    U: OutputValue,
    F: Fn(T) -> Result<U, OutputError> + Send + Sync + 'static,
  {
    let upstream = self.clone();
    let f = Arc::new(f);

    Output::derived(self.inner.secret, self.inner.dependencies.clone(), move || {
      let upstream = upstream.clone();
      let f = Arc::clone(&f);
      async move {
        let settled = upstream.settle().await;
        let value = match settled.value {
          Ok(Some(value)) => f(value).map(Some),
          Ok(None) => Ok(None),
          Err(err) => Err(err),
        };
        Settled {
          value,
          secret: settled.secret,
        }
      }
      .boxed()
    })
  }

  /// Chain into another output produced from the resolved value.
  ///
  /// The result is secret if either side is. Resources referenced only by
  /// the output returned from `f` are not visible to the graph builder.
  pub fn apply<U, F>(&self, f: F) -> Output<U>
  where
    U: OutputValue,
    F: Fn(T) -> Output<U> + Send + Sync + 'static,
  {
    let upstream = self.clone();
    let f = Arc::new(f);

    Output::derived(self.inner.secret, self.inner.dependencies.clone(), move || {
      let upstream = upstream.clone();
      let f = Arc::clone(&f);
      async move {
        let settled = upstream.settle().await;
        match settled.value {
          Ok(Some(value)) => {
            let next = f(value).settle().await;
            Settled {
              value: next.value,
              secret: settled.secret || next.secret,
            }
          }
          Ok(None) => Settled {
            value: Ok(None),
            secret: settled.secret,
          },
          Err(err) => Settled::failed(err, settled.secret),
        }
      }
      .boxed()
    })
  }

  /// Combine several outputs into one that resolves once all of them have.
  ///
  /// The failure of the earliest failing input, in argument order, wins.
  /// Inputs after it are not awaited further. If every input succeeds but
  /// any is unknown, the result is unknown.
  pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
    let secret = outputs.iter().any(|o| o.inner.secret);
    let dependencies = outputs
      .iter()
      .flat_map(|o| o.inner.dependencies.iter().cloned())
      .collect();

    Output::derived(secret, dependencies, move || {
      let outputs = outputs.clone();
      async move {
        match settle_in_order(&outputs).await {
          Ok(values) => {
            let any_secret = secret || values.iter().any(|(_, s)| *s);
            let value = values.into_iter().map(|(v, _)| v).collect::<Option<Vec<T>>>();
            Settled {
              value: Ok(value),
              secret: any_secret,
            }
          }
          Err(err) => Settled::failed(err, secret),
        }
      }
      .boxed()
    })
  }

  /// Pair this output with another.
  pub fn zip<U: OutputValue>(&self, other: &Output<U>) -> Output<(T, U)> {
    let left = self.clone();
    let right = other.clone();
    let secret = left.inner.secret || right.inner.secret;
    let dependencies = left
      .inner
      .dependencies
      .union(&right.inner.dependencies)
      .cloned()
      .collect();

    Output::derived(secret, dependencies, move || {
      let left = left.clone();
      let right = right.clone();
      async move {
        // A right-hand failure still waits for the left side, which wins if
        // it fails too.
        let (a, b) = match future::select(left.settle().boxed(), right.settle().boxed()).await {
          Either::Left((l, right)) => {
            let a = match l.value {
              Ok(a) => (a, l.secret),
              Err(err) => return Settled::failed(err, secret),
            };
            let r = right.await;
            (Ok(a), r.value.map(|b| (b, r.secret)))
          }
          Either::Right((r, left)) => {
            let l = left.await;
            (l.value.map(|a| (a, l.secret)), r.value.map(|b| (b, r.secret)))
          }
        };

        match (a, b) {
          (Err(err), _) | (_, Err(err)) => Settled::failed(err, secret),
          (Ok((a, a_secret)), Ok((b, b_secret))) => Settled {
            value: Ok(a.zip(b)),
            secret: secret || a_secret || b_secret,
          },
        }
      }
      .boxed()
    })
  }

  /// A copy of this output that is marked secret.
  pub fn as_secret(&self) -> Output<T> {
    let upstream = self.clone();
    Output::derived(true, self.inner.dependencies.clone(), move || {
      let upstream = upstream.clone();
      async move {
        let mut settled = upstream.settle().await;
        settled.secret = true;
        settled
      }
      .boxed()
    })
  }

  /// Erase the value type into a dynamic [`Value`].
  pub fn into_value(self) -> Output<Value>
  where
    T: Into<Value>,
  {
    self.map(Into::into)
  }
}

impl Output<String> {
  /// Concatenate string outputs, e.g. to build `HOST=<name>` entries.
  pub fn concat(parts: Vec<Output<String>>) -> Output<String> {
    Output::all(parts).map(|parts| parts.concat())
  }
}

impl Output<Value> {
  /// Combine outputs into an array value.
  pub fn array(items: Vec<Output<Value>>) -> Output<Value> {
    Output::all(items).map(Value::Array)
  }

  /// Combine named outputs into an object value.
  pub fn object(fields: Vec<(String, Output<Value>)>) -> Output<Value> {
    let (keys, values): (Vec<String>, Vec<Output<Value>>) = fields.into_iter().unzip();
    Output::all(values).map(move |values| Value::Object(keys.iter().cloned().zip(values).collect::<BTreeMap<_, _>>()))
  }
}

/// Settle `outputs` concurrently.
///
/// Returns each value with its secrecy, or the failure of the lowest-index
/// failing input once every input before it has settled.
async fn settle_in_order<T: OutputValue>(outputs: &[Output<T>]) -> Result<Vec<(Option<T>, bool)>, OutputError> {
  let mut pending: FuturesUnordered<_> = outputs
    .iter()
    .enumerate()
    .map(|(index, output)| async move { (index, output.settle().await) })
    .collect();

  let mut values: Vec<Option<(Option<T>, bool)>> = (0..outputs.len()).map(|_| None).collect();
  let mut failures = BTreeMap::new();
  while let Some((index, settled)) = pending.next().await {
    match settled.value {
      Ok(value) => values[index] = Some((value, settled.secret)),
      Err(err) => {
        failures.insert(index, err);
      }
    }
    if let Some(first) = failures.first_entry() {
      if values[..*first.key()].iter().all(Option::is_some) {
        return Err(first.remove());
      }
    }
  }

  Ok(values.into_iter().flatten().collect())
}

impl<T: OutputValue> From<T> for Output<T> {
  fn from(value: T) -> Self {
    Output::new(value)
  }
}

impl From<&str> for Output<Value> {
  fn from(value: &str) -> Self {
    Output::new(Value::from(value))
  }
}

impl From<String> for Output<Value> {
  fn from(value: String) -> Self {
    Output::new(Value::from(value))
  }
}

impl From<f64> for Output<Value> {
  fn from(value: f64) -> Self {
    Output::new(Value::from(value))
  }
}

impl<T: OutputValue + fmt::Debug> fmt::Debug for Output<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut out = f.debug_struct("Output");
    if self.is_secret() {
      out.field("state", &"[secret]");
    } else {
      out.field("state", &self.state());
    }
    out.field("dependencies", &self.inner.dependencies).finish()
  }
}

/// Settles a deferred [`Output`].
///
/// Each method consumes the sender, so an output is settled at most once.
/// Dropping the sender without settling fails the output with
/// [`OutputError::Abandoned`].
pub struct OutputSender<T> {
  tx: watch::Sender<Option<Settled<T>>>,
  secret: bool,
}

impl<T: OutputValue> OutputSender<T> {
  pub fn resolve(self, value: T) {
    self.send(Ok(Some(value)));
  }

  /// Resolve, and mark the value secret if `secret` is set even though the
  /// output was not declared secret.
  pub fn resolve_with(mut self, value: T, secret: bool) {
    self.secret |= secret;
    self.send(Ok(Some(value)));
  }

  pub fn unknown(self) {
    self.send(Ok(None));
  }

  pub fn fail(self, err: OutputError) {
    self.send(Err(err));
  }

  fn send(self, value: Result<Option<T>, OutputError>) {
    let secret = self.secret;
    self.tx.send_replace(Some(Settled { value, secret }));
  }
}
