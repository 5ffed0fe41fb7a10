#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_demand_streams::{StreamError, Subscriber, Subscription};

pub enum Signal<T> {
    Next(T),
    Error(StreamError),
    Complete,
}

/// Test side view of a [Recorder]: everything it received plus access to its subscription
pub struct Probe<T> {
    signals: Mutex<Vec<Signal<T>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    subscribes: AtomicUsize,
    in_next: AtomicBool,
    overlaps: AtomicUsize,
}

impl<T: Clone> Probe<T> {
    pub fn request(&self, n: i64) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").request(n)
    }
    pub fn cancel(&self) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").cancel()
    }
    pub fn is_cancelled(&self) -> bool {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").is_cancelled()
    }
    pub fn items(&self) -> Vec<T> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Signal::Next(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
    pub fn completions(&self) -> usize {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Signal::Complete))
            .count()
    }
    pub fn errors(&self) -> usize {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Signal::Error(_)))
            .count()
    }
    /// Number of terminal signals
    pub fn terminals(&self) -> usize {
        self.completions() + self.errors()
    }
    pub fn error_matches(&self, f: impl Fn(&StreamError) -> bool) -> bool {
        self.signals.lock().unwrap().iter().any(|s| match s {
            Signal::Error(e) => f(e),
            _ => false,
        })
    }
    /// Whether the last signal is terminal and nothing follows the first terminal signal
    pub fn terminal_is_last(&self) -> bool {
        let signals = self.signals.lock().unwrap();
        match signals
            .iter()
            .position(|s| matches!(s, Signal::Error(_) | Signal::Complete))
        {
            Some(pos) => pos == signals.len() - 1,
            None => false,
        }
    }
}

type NextHook<T> = Box<dyn FnMut(&T, &dyn Subscription) + Send>;

/// Subscriber recording every signal into a shared [Probe]
pub struct Recorder<T> {
    probe: Arc<Probe<T>>,
    initial: Option<i64>,
    subscription: Option<Arc<dyn Subscription>>,
    on_next: Option<NextHook<T>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new(initial: Option<i64>) -> (Self, Arc<Probe<T>>) {
        let probe = Arc::new(Probe {
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            subscribes: AtomicUsize::new(0),
            in_next: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        });
        (
            Self {
                probe: probe.clone(),
                initial,
                subscription: None,
                on_next: None,
            },
            probe,
        )
    }

    /// Run ```f``` after each recorded item, with access to the subscription
    pub fn with_hook(mut self, f: impl FnMut(&T, &dyn Subscription) + Send + 'static) -> Self {
        self.on_next = Some(Box::new(f));
        self
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for Recorder<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.probe.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.probe.subscription.lock().unwrap() = Some(subscription.clone());
        self.subscription = Some(subscription.clone());
        if let Some(n) = self.initial {
            subscription.request(n);
        }
    }
    fn on_next(&mut self, item: T) {
        if self.probe.in_next.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.probe
            .signals
            .lock()
            .unwrap()
            .push(Signal::Next(item.clone()));
        if let (Some(hook), Some(subscription)) = (self.on_next.as_mut(), self.subscription.as_ref())
        {
            hook(&item, &**subscription);
        }
        self.probe.in_next.store(false, Ordering::SeqCst);
    }
    fn on_error(&mut self, error: StreamError) {
        self.probe.signals.lock().unwrap().push(Signal::Error(error));
    }
    fn on_complete(&mut self) {
        self.probe.signals.lock().unwrap().push(Signal::Complete);
    }
}
