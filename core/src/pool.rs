//! Reusable instance pool
//!
//! Used internally to avoid per-tick allocation (formatting buffers). A pool
//! belongs to one thread; with the `enforce-thread-safety` feature every call
//! checks that it runs on the thread that created the pool.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::Arc;

use hashbrown::HashSet;

/// Default upper bound of retained instances
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Errors raised by [`ObjectPool`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Instance was released while already pooled
    #[error("instance released to the pool twice")]
    DoubleRelease,

    /// Pool accessed from a thread other than its owner
    #[error("pool owned by thread {owner} accessed from thread {current}")]
    WrongThread { owner: String, current: String },
}

/// Identity used to detect double releases
///
/// Returns `None` for values without a stable identity (e.g. an unallocated
/// `String`); those are never reported as released twice.
pub trait InstanceKey {
    fn instance_key(&self) -> Option<usize>;
}

impl<T: ?Sized> InstanceKey for Rc<T> {
    fn instance_key(&self) -> Option<usize> {
        Some(Rc::as_ptr(self) as *const () as usize)
    }
}

impl<T: ?Sized> InstanceKey for Arc<T> {
    fn instance_key(&self) -> Option<usize> {
        Some(Arc::as_ptr(self) as *const () as usize)
    }
}

impl<T: ?Sized> InstanceKey for Box<T> {
    fn instance_key(&self) -> Option<usize> {
        // Zero-sized boxes share a dangling address
        if std::mem::size_of_val::<T>(&**self) == 0 {
            None
        } else {
            Some(&**self as *const T as *const () as usize)
        }
    }
}

impl InstanceKey for String {
    fn instance_key(&self) -> Option<usize> {
        (self.capacity() > 0).then(|| self.as_ptr() as usize)
    }
}

impl<T> InstanceKey for Vec<T> {
    fn instance_key(&self) -> Option<usize> {
        (self.capacity() > 0 && size_of::<T>() > 0).then(|| self.as_ptr() as usize)
    }
}

type Hook<T> = Box<dyn Fn(&mut T) + Send>;

/// Pool of reusable instances
pub struct ObjectPool<T: InstanceKey> {
    /// Inactive instances, most recently released last
    stack: Vec<T>,
    /// Keys of instances currently in `stack`
    pooled: HashSet<usize>,
    create: Box<dyn Fn() -> T + Send>,
    on_get: Option<Hook<T>>,
    on_release: Option<Hook<T>>,
    on_destroy: Option<Box<dyn Fn(T) + Send>>,
    max_size: usize,
    /// Instances created and not destroyed
    count_all: usize,
    #[cfg(feature = "enforce-thread-safety")]
    owner: std::thread::ThreadId,
}

impl<T: InstanceKey> ObjectPool<T> {
    /// Create a pool that builds new instances with `create`
    pub fn new(create: impl Fn() -> T + Send + 'static) -> Self {
        Self {
            stack: Vec::new(),
            pooled: HashSet::new(),
            create: Box::new(create),
            on_get: None,
            on_release: None,
            on_destroy: None,
            max_size: DEFAULT_MAX_SIZE,
            count_all: 0,
            #[cfg(feature = "enforce-thread-safety")]
            owner: std::thread::current().id(),
        }
    }

    /// Hook run on every instance handed out
    pub fn on_get(mut self, hook: impl Fn(&mut T) + Send + 'static) -> Self {
        self.on_get = Some(Box::new(hook));
        self
    }

    /// Reset hook run on every released instance
    pub fn on_release(mut self, hook: impl Fn(&mut T) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Hook receiving instances discarded because the pool is full
    pub fn on_destroy(mut self, hook: impl Fn(T) + Send + 'static) -> Self {
        self.on_destroy = Some(Box::new(hook));
        self
    }

    /// Maximum number of inactive instances retained
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Take a pooled instance, or create one if the pool is empty
    pub fn get(&mut self) -> Result<T, PoolError> {
        self.check_thread()?;

        let mut item = match self.stack.pop() {
            Some(item) => {
                if let Some(key) = item.instance_key() {
                    self.pooled.remove(&key);
                }
                item
            }
            None => {
                self.count_all += 1;
                (self.create)()
            }
        };

        if let Some(hook) = &self.on_get {
            hook(&mut item);
        }
        Ok(item)
    }

    /// Return an instance to the pool
    ///
    /// Instances beyond the size bound are passed to the destroy hook.
    pub fn release(&mut self, mut item: T) -> Result<(), PoolError> {
        self.check_thread()?;

        let key = item.instance_key();
        if let Some(key) = key
            && self.pooled.contains(&key)
        {
            return Err(PoolError::DoubleRelease);
        }

        if let Some(hook) = &self.on_release {
            hook(&mut item);
        }

        if self.stack.len() < self.max_size {
            // Reset hooks may reallocate, so the key is taken afterwards
            if let Some(key) = item.instance_key() {
                self.pooled.insert(key);
            }
            self.stack.push(item);
        } else {
            self.count_all = self.count_all.saturating_sub(1);
            if let Some(hook) = &self.on_destroy {
                hook(item);
            }
        }
        Ok(())
    }

    /// Acquire an instance that is released when the guard drops
    pub fn scoped(&mut self) -> Result<PooledObject<'_, T>, PoolError> {
        let item = self.get()?;
        Ok(PooledObject {
            pool: self,
            item: Some(item),
        })
    }

    /// Instances created and not destroyed
    pub fn count_all(&self) -> usize {
        self.count_all
    }

    /// Instances currently waiting in the pool
    pub fn count_inactive(&self) -> usize {
        self.stack.len()
    }

    /// Instances currently handed out
    pub fn count_active(&self) -> usize {
        self.count_all.saturating_sub(self.stack.len())
    }

    /// Destroy every inactive instance
    pub fn clear(&mut self) {
        self.pooled.clear();
        for item in self.stack.drain(..) {
            self.count_all = self.count_all.saturating_sub(1);
            if let Some(hook) = &self.on_destroy {
                hook(item);
            }
        }
    }

    #[cfg(feature = "enforce-thread-safety")]
    fn check_thread(&self) -> Result<(), PoolError> {
        let current = std::thread::current().id();
        if current == self.owner {
            Ok(())
        } else {
            Err(PoolError::WrongThread {
                owner: format!("{:?}", self.owner),
                current: format!("{:?}", current),
            })
        }
    }

    #[cfg(not(feature = "enforce-thread-safety"))]
    fn check_thread(&self) -> Result<(), PoolError> {
        Ok(())
    }
}

/// Scoped acquisition that returns the instance on every exit path
pub struct PooledObject<'a, T: InstanceKey> {
    pool: &'a mut ObjectPool<T>,
    item: Option<T>,
}

impl<T: InstanceKey> Deref for PooledObject<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: InstanceKey> DerefMut for PooledObject<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled object used after release"),
        }
    }
}

impl<T: InstanceKey> Drop for PooledObject<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take()
            && let Err(e) = self.pool.release(item)
        {
            tracing::error!("Failed to return pooled instance: {}", e);
        }
    }
}

thread_local! {
    static STRING_POOL: RefCell<ObjectPool<String>> = RefCell::new(
        ObjectPool::new(|| String::with_capacity(64))
            .on_release(|s: &mut String| s.clear())
            .max_size(64),
    );
}

/// Run `f` with a cleared string buffer borrowed from this thread's pool
pub fn with_string<R>(f: impl FnOnce(&mut String) -> R) -> R {
    // Returns the buffer even if `f` unwinds
    struct Lease(String);

    impl Drop for Lease {
        fn drop(&mut self) {
            let buffer = std::mem::take(&mut self.0);
            let _ = STRING_POOL.try_with(|pool| {
                if let Ok(mut pool) = pool.try_borrow_mut()
                    && let Err(e) = pool.release(buffer)
                {
                    tracing::error!("Failed to return string buffer: {}", e);
                }
            });
        }
    }

    let buffer = STRING_POOL
        .with(|pool| pool.borrow_mut().get())
        .unwrap_or_default();
    let mut lease = Lease(buffer);
    lease.0.clear();
    f(&mut lease.0)
}
