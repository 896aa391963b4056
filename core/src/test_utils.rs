//! Shared test utilities for integration and unit tests

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use glam::Vec3;
use hashbrown::HashMap;

use crate::event::MulticastEvent;
use crate::logging::MonitoringLogger;
use crate::monitor::Monitor;
use crate::profile::Profile;
use crate::reflection::{Assembly, DiscoveryRules, ParamSig, ReflectionCache, TypeBuilder, TypeDecl};
use crate::settings::MonitoringSettings;
use crate::unit::{Unit, UnitId};
use crate::value::{MonitorValue, ValueType};

// ============================================================================
// Fixture Types
// ============================================================================

/// Monitored test target with interior mutability
pub struct Player {
    pub name: String,
    pub health: Cell<f32>,
    pub level: Cell<i32>,
    pub position: Cell<Vec3>,
    /// Makes the `fragile` field panic when read
    pub fail: Cell<bool>,
    /// Number of `ping` invocations
    pub pings: Cell<u32>,
    pub on_damage: MulticastEvent<f32>,
}

impl Player {
    pub fn new(name: &str, health: f32) -> Self {
        Self {
            name: name.to_string(),
            health: Cell::new(health),
            level: Cell::new(1),
            position: Cell::new(Vec3::ZERO),
            fail: Cell::new(false),
            pings: Cell::new(0),
            on_damage: MulticastEvent::new(),
        }
    }

    pub fn take_damage(&self, amount: f32) {
        self.health.set(self.health.get() - amount);
        self.on_damage.invoke(&amount);
    }
}

/// Second target type, sharing no members with [`Player`]
pub struct Enemy {
    pub health: Cell<f32>,
    pub boss: bool,
}

impl Enemy {
    pub fn new(health: f32, boss: bool) -> Self {
        Self {
            health: Cell::new(health),
            boss,
        }
    }
}

/// Holder of the static members
pub struct World;

thread_local! {
    /// Backing value of `World.frame_count`
    pub static FRAME_COUNT: Cell<u64> = const { Cell::new(0) };
    /// Backing event of `World.on_spawn`
    pub static ON_SPAWN: Rc<MulticastEvent<String>> = Rc::new(MulticastEvent::new());
}

// ============================================================================
// Declarations
// ============================================================================

pub fn player_type() -> TypeDecl {
    let mut ty = TypeBuilder::<Player>::new("Player");
    ty.field("health", |p| p.health.get())
        .setter(|p, v| p.health.set(v))
        .tag("vital");
    ty.field("level", |p| p.level.get());
    ty.property("position", |p| p.position.get()).precision(1);
    ty.field("fragile", |p| {
        if p.fail.get() {
            panic!("fragile read");
        }
        1
    });
    ty.method("ping", |p| {
        p.pings.set(p.pings.get() + 1);
        p.pings.get()
    });
    ty.method_with_args("scaled_health", &[("factor", ValueType::F32)], |p, args| {
        match args.first() {
            Some(MonitorValue::F32(factor)) => Ok(p.health.get() * factor),
            _ => Err("factor must be f32".to_string()),
        }
    })
    .args(vec![MonitorValue::F32(0.5)]);
    ty.method_with_out(
        "bounds",
        vec![ParamSig::out("min", ValueType::F32), ParamSig::out("max", ValueType::F32)],
        |p, _, out| {
            out.push(MonitorValue::F32(0.0));
            out.push(MonitorValue::F32(p.health.get()));
        },
    );
    ty.event("on_damage", |p| &p.on_damage);
    ty.build()
}

pub fn enemy_type() -> TypeDecl {
    let mut ty = TypeBuilder::<Enemy>::new("Enemy");
    ty.field("health", |e| e.health.get()).tag("hostile");
    ty.field("boss", |e| e.boss).tag("boss fight");
    ty.build()
}

pub fn world_type() -> TypeDecl {
    let mut ty = TypeBuilder::<World>::new("World");
    ty.static_field("frame_count", || FRAME_COUNT.with(Cell::get));
    ty.static_event("on_spawn", || ON_SPAWN.with(Rc::clone));
    ty.build()
}

/// Assembly holding every fixture type
pub fn game_assembly() -> Assembly {
    Assembly::new("Game")
        .with_type(player_type())
        .with_type(enemy_type())
        .with_type(world_type())
}

// ============================================================================
// Settings and Sessions
// ============================================================================

/// Default settings with markup off, so rendered states are plain text
pub fn plain_settings() -> MonitoringSettings {
    let mut settings = MonitoringSettings::default();
    settings.formatting.rich_text = false;
    settings
}

/// Settings for a session that profiles synchronously
pub fn sync_settings() -> MonitoringSettings {
    let mut settings = plain_settings();
    settings.general.async_profiling = false;
    settings
}

/// Session with the game assembly installed and the display visible
pub fn sync_monitor() -> Monitor {
    monitor_with(sync_settings())
}

/// Session over the game assembly with custom settings
pub fn monitor_with(settings: MonitoringSettings) -> Monitor {
    let mut monitor = Monitor::new(Arc::new(settings));
    monitor
        .begin_profiling(vec![game_assembly()])
        .expect("profiling should succeed");
    monitor
}

// ============================================================================
// Profiles
// ============================================================================

/// Profiles of the game assembly, looked up by member name
pub struct TestProfiles {
    by_name: HashMap<String, Arc<Profile>>,
}

impl TestProfiles {
    pub fn get(&self, member: &str) -> &Arc<Profile> {
        self.by_name
            .get(member)
            .unwrap_or_else(|| panic!("no profile for {}", member))
    }

    /// Bind a profile to `target` under the name "Hero"
    pub fn unit(&self, member: &str, target: Option<&Rc<dyn Any>>) -> Unit {
        self.get(member).create_unit(target, "Hero")
    }
}

pub fn test_profiles() -> TestProfiles {
    test_profiles_with(plain_settings())
}

/// Scan the game assembly synchronously
///
/// Member names are unique across the fixture types except `health`, which
/// resolves to the first type declaring it (`Player`).
pub fn test_profiles_with(settings: MonitoringSettings) -> TestProfiles {
    let cache = ReflectionCache::new(
        Arc::new(settings),
        MonitoringLogger::default(),
        DiscoveryRules::default(),
    );
    let batch = cache
        .scan(&[game_assembly()], &AtomicBool::new(false))
        .expect("scan should succeed");

    let mut by_name = HashMap::new();
    for profile in batch.profiles {
        let name = profile.descriptor().member_name.clone();
        by_name.entry(name).or_insert_with(|| Arc::new(profile));
    }
    TestProfiles { by_name }
}

/// `N` distinct unit ids
pub fn ids<const N: usize>() -> [UnitId; N] {
    std::array::from_fn(|i| UnitId::from_raw(i as u64))
}
