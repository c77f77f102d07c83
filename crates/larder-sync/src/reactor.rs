//! Explicit reactive effects.
//!
//! A rule watches a value derived from some context and runs an effect when
//! that value changes. Nothing is tracked implicitly: the owner calls
//! [`Reactor::flush`] at the end of every transaction that mutates the
//! context.
//!
//! A flush evaluates every rule before running any effect, so no effect
//! observes a half-applied batch. Effects that change the context are picked
//! up by another pass within the same flush.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Effect produced by a rule evaluation.
pub type Effect = Box<dyn FnOnce() + Send>;

/// Passes per flush before the reactor gives up settling.
pub const MAX_PASSES: usize = 8;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A watched derivation.
pub trait Rule<C>: Send + Sync {
    fn name(&self) -> &str;

    /// Re-derive from `ctx`. Returns the effect to run if the value changed
    /// since the last evaluation; the first evaluation only records it.
    fn evaluate(&self, ctx: &C) -> Option<Effect>;

    /// Record the current value as the baseline without running anything.
    fn rebase(&self, ctx: &C);
}

struct Debounce {
    window: Duration,
    generation: Arc<AtomicU64>,
}

type Derive<C, V> = Box<dyn Fn(&C) -> V + Send + Sync>;
type Sink<V> = Arc<dyn Fn(V) + Send + Sync>;

/// Rule built from a derive function and an effect callback.
struct Reaction<C, V> {
    name: String,
    derive: Derive<C, V>,
    effect: Sink<V>,
    last: Mutex<Option<V>>,
    debounce: Option<Debounce>,
}

impl<C, V> Reaction<C, V>
where
    C: 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn scheduled(&self, value: V) -> Effect {
        let effect = Arc::clone(&self.effect);
        let Some(debounce) = &self.debounce else {
            return Box::new(move || effect(value));
        };

        let generation = debounce.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&debounce.generation);
        let window = debounce.window;
        let name = self.name.clone();
        Box::new(move || match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    if current.load(Ordering::SeqCst) == generation {
                        effect(value);
                    } else {
                        tracing::debug!(rule = %name, "debounced effect superseded");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(rule = %name, "no runtime for debounced effect, running now");
                effect(value);
            }
        })
    }
}

impl<C, V> Rule<C> for Reaction<C, V>
where
    C: 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &C) -> Option<Effect> {
        let value = (self.derive)(ctx);
        {
            let mut last = lock(&self.last);
            if last.as_ref() == Some(&value) {
                return None;
            }
            if last.replace(value.clone()).is_none() {
                tracing::trace!(rule = %self.name, "baseline recorded");
                return None;
            }
        }
        tracing::debug!(rule = %self.name, "derived value changed");
        Some(self.scheduled(value))
    }

    fn rebase(&self, ctx: &C) {
        let value = (self.derive)(ctx);
        *lock(&self.last) = Some(value);
    }
}

/// Resets the flushing flag when a flush exits.
struct Flushing<'a>(&'a AtomicBool);

impl Drop for Flushing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ordered set of rules over a context `C`.
pub struct Reactor<C> {
    rules: Mutex<Vec<Arc<dyn Rule<C>>>>,
    flushing: AtomicBool,
}

impl<C: 'static> Default for Reactor<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Reactor<C> {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            flushing: AtomicBool::new(false),
        }
    }

    /// Run `effect` whenever `derive` yields a different value.
    pub fn watch<V, D, F>(&self, name: &str, derive: D, effect: F)
    where
        V: Clone + PartialEq + Send + Sync + 'static,
        D: Fn(&C) -> V + Send + Sync + 'static,
        F: Fn(V) + Send + Sync + 'static,
    {
        self.push(name, Box::new(derive), Arc::new(effect), None);
    }

    /// Like [`watch`](Self::watch), but the effect runs `window` after the
    /// last change; a newer change within the window supersedes it.
    pub fn watch_debounced<V, D, F>(&self, name: &str, window: Duration, derive: D, effect: F)
    where
        V: Clone + PartialEq + Send + Sync + 'static,
        D: Fn(&C) -> V + Send + Sync + 'static,
        F: Fn(V) + Send + Sync + 'static,
    {
        let debounce = Debounce {
            window,
            generation: Arc::new(AtomicU64::new(0)),
        };
        self.push(name, Box::new(derive), Arc::new(effect), Some(debounce));
    }

    fn push<V>(&self, name: &str, derive: Derive<C, V>, effect: Sink<V>, debounce: Option<Debounce>)
    where
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        self.add_rule(Arc::new(Reaction {
            name: name.to_string(),
            derive,
            effect,
            last: Mutex::new(None),
            debounce,
        }));
    }

    pub fn add_rule(&self, rule: Arc<dyn Rule<C>>) {
        lock(&self.rules).push(rule);
    }

    pub fn len(&self) -> usize {
        lock(&self.rules).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }

    /// Record every rule's current value as its baseline.
    pub fn rebase(&self, ctx: &C) {
        for rule in self.snapshot() {
            rule.rebase(ctx);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Rule<C>>> {
        lock(&self.rules).clone()
    }

    /// Evaluate all rules and run the effects of those that changed,
    /// repeating until nothing changes.
    ///
    /// Returns the number of effects run (or scheduled, for debounced
    /// rules). A flush requested from inside an effect returns 0; the
    /// running flush re-evaluates after its effects.
    pub fn flush(&self, ctx: &C) -> usize {
        if self.flushing.swap(true, Ordering::SeqCst) {
            tracing::trace!("flush requested while flushing");
            return 0;
        }
        let _flushing = Flushing(&self.flushing);

        let rules = self.snapshot();
        let mut ran = 0;
        for pass in 1..=MAX_PASSES {
            let effects: Vec<Effect> = rules.iter().filter_map(|rule| rule.evaluate(ctx)).collect();
            if effects.is_empty() {
                return ran;
            }
            ran += effects.len();
            for effect in effects {
                effect();
            }
            if pass == MAX_PASSES {
                tracing::warn!(passes = MAX_PASSES, "reactor did not settle, stopping flush");
            }
        }
        ran
    }
}
