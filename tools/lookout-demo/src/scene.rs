//! Simulated scene with monitored types
//!
//! Stands in for a host game: a few ships and asteroids drifting around, a
//! global clock and the declarations that expose them to the monitor.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::{Vec2, Vec3};
use lookout_core::reflection::ParamSig;
use lookout_core::{Assembly, MonitorValue, MulticastEvent, Rgba, TypeBuilder, TypeDecl, ValueType};

pub struct Ship {
    pub callsign: String,
    pub position: Cell<Vec3>,
    pub velocity: Cell<Vec2>,
    pub fuel: Cell<f32>,
    pub shields: Cell<bool>,
    pub cargo: RefCell<Vec<u32>>,
    pub on_hit: MulticastEvent<f32>,
}

impl Ship {
    fn new(callsign: &str, velocity: Vec2) -> Self {
        Self {
            callsign: callsign.to_string(),
            position: Cell::new(Vec3::ZERO),
            velocity: Cell::new(velocity),
            fuel: Cell::new(100.0),
            shields: Cell::new(true),
            cargo: RefCell::new(vec![3, 1]),
            on_hit: MulticastEvent::new(),
        }
    }

    fn step(&self, dt: f32) {
        let v = self.velocity.get();
        self.position.set(self.position.get() + Vec3::new(v.x, 0.0, v.y) * dt);
        self.fuel.set((self.fuel.get() - 2.0 * dt).max(0.0));
        if self.fuel.get() < 50.0 {
            self.shields.set(false);
        }
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        self.position.get().distance(point)
    }
}

pub struct Asteroid {
    pub mass: Cell<f32>,
    pub tint: Rgba,
}

/// Global state exposed through static members
pub struct Clock;

thread_local! {
    static ELAPSED_FRAMES: Cell<u64> = const { Cell::new(0) };
    static ON_WAVE: Rc<MulticastEvent<u32>> = Rc::new(MulticastEvent::new());
}

fn ship_type() -> TypeDecl {
    let mut ty = TypeBuilder::<Ship>::new("Ship");
    ty.field("position", |s| s.position.get()).precision(1);
    ty.field("velocity", |s| s.velocity.get())
        .setter(|s, v| s.velocity.set(v));
    ty.field("fuel", |s| s.fuel.get())
        .setter(|s, v| s.fuel.set(v))
        .processor("gauge")
        .tag("vital");
    ty.property("shields", |s| s.shields.get()).tag("vital");
    ty.property("cargo", |s| s.cargo.borrow().clone());
    ty.method_with_args("distance_to", &[("point", ValueType::Vec3)], |s, args| {
        match args.first() {
            Some(MonitorValue::Vec3(point)) => Ok(s.distance_to(*point)),
            _ => Err("point must be a Vec3".to_string()),
        }
    })
    .args(vec![MonitorValue::Vec3(Vec3::ZERO)])
    .label("Distance From Origin");
    ty.method_with_out(
        "fuel_range",
        vec![ParamSig::out("low", ValueType::F32), ParamSig::out("high", ValueType::F32)],
        |s, _, out| {
            let fuel = s.fuel.get();
            out.push(MonitorValue::F32(fuel * 0.8));
            out.push(MonitorValue::F32(fuel * 1.2));
        },
    );
    ty.event("on_hit", |s| &s.on_hit).tag("combat");
    ty.processor::<f32>("gauge", |fuel| {
        let filled = (fuel / 10.0).round().clamp(0.0, 10.0) as usize;
        format!("[{}{}] {:.0}%", "#".repeat(filled), ".".repeat(10 - filled), fuel)
    });
    ty.build()
}

fn asteroid_type() -> TypeDecl {
    let mut ty = TypeBuilder::<Asteroid>::new("Asteroid");
    ty.field("mass", |a| a.mass.get()).tag("hazard");
    ty.field("tint", |a| a.tint);
    // Refers to a processor the type never declares
    ty.field("m_density", |a| a.mass.get() / 4.0).processor("per_volume");
    ty.build()
}

fn clock_type() -> TypeDecl {
    let mut ty = TypeBuilder::<Clock>::new("Clock");
    ty.static_field("elapsed_frames", || ELAPSED_FRAMES.with(Cell::get));
    ty.static_event("on_wave", || ON_WAVE.with(Rc::clone)).show_signature();
    ty.build()
}

/// Assemblies offered to discovery
///
/// Besides the game itself this includes a denylisted library and one
/// assembly that cannot be read, so the scan statistics show both paths.
pub fn assemblies() -> Vec<Assembly> {
    vec![
        Assembly::new("demo-game")
            .with_type(ship_type())
            .with_type(asteroid_type())
            .with_type(clock_type()),
        Assembly::new("std").with_type(clock_type()),
        Assembly::unreadable("demo-plugins", "missing symbol table"),
    ]
}

/// Live scene objects
pub struct Scene {
    pub ships: Vec<Rc<Ship>>,
    pub asteroids: Vec<Rc<Asteroid>>,
    frame: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            ships: vec![
                Rc::new(Ship::new("Falcon", Vec2::new(4.0, 1.0))),
                Rc::new(Ship::new("Osprey", Vec2::new(-2.0, 3.0))),
            ],
            asteroids: vec![Rc::new(Asteroid {
                mass: Cell::new(1200.0),
                tint: Rgba::new(160, 120, 90, 255),
            })],
            frame: 0,
        }
    }

    /// Advance the simulation by one frame
    pub fn step(&mut self, dt: f32) {
        self.frame += 1;
        ELAPSED_FRAMES.with(|frames| frames.set(self.frame));

        for ship in &self.ships {
            ship.step(dt);
        }
        for asteroid in &self.asteroids {
            asteroid.mass.set(asteroid.mass.get() - 0.5);
        }

        if self.frame % 30 == 0
            && let Some(ship) = self.ships.first()
        {
            ship.on_hit.invoke(&5.0);
            ship.cargo.borrow_mut().push(self.frame as u32);
        }
        if self.frame % 60 == 0 {
            ON_WAVE.with(|wave| wave.invoke(&((self.frame / 60) as u32)));
        }
    }

    /// Remove the last ship from the scene
    pub fn destroy_ship(&mut self) -> Option<Rc<Ship>> {
        self.ships.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use lookout_core::{ErrorCategory, Monitor, MonitoringSettings, ProfilingStatus};

    fn sync_monitor() -> Monitor {
        let mut settings = MonitoringSettings::default();
        settings.general.async_profiling = false;
        settings.formatting.rich_text = false;
        let mut monitor = Monitor::new(Arc::new(settings));
        monitor.begin_profiling(assemblies()).unwrap();
        monitor
    }

    #[test]
    fn test_scene_profiles() {
        let monitor = sync_monitor();
        assert_eq!(monitor.status(), ProfilingStatus::Ready);

        let stats = monitor.stats();
        assert_eq!(stats.assemblies_scanned, 1);
        assert_eq!(stats.assemblies_skipped, 2);
        assert_eq!(stats.profiles_created, 13);
        assert_eq!(stats.errors(ErrorCategory::ProcessorNotFound), 1);
    }

    #[test]
    fn test_scene_units_follow_objects() {
        let mut monitor = sync_monitor();
        let mut scene = Scene::new();
        for ship in &scene.ships {
            assert_eq!(monitor.register_target(ship, &ship.callsign).len(), 8);
        }
        for asteroid in &scene.asteroids {
            monitor.register_target(asteroid, "Rock");
        }
        assert_eq!(monitor.units().len(), 2 * 8 + 3 + 2);

        let dt = Duration::from_millis(16);
        for _ in 0..10 {
            scene.step(dt.as_secs_f32());
            monitor.tick(dt);
        }
        let fuel = monitor.find("Fuel", "Falcon").unwrap();
        assert!(monitor.unit(fuel).unwrap().state().starts_with("Fuel: ["));

        drop(scene.destroy_ship());
        for _ in 0..10 {
            monitor.tick(dt);
        }
        assert!(monitor.find("Fuel", "Osprey").is_none());
        assert_eq!(monitor.units().len(), 8 + 3 + 2);
    }
}
