//! Integration tests for the monitoring session
//!
//! Tests full profiling, target registration, frame ticking, filtering and
//! shutdown through the public `Monitor` API.

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::error::{ErrorCategory, MonitorError};
    use crate::logging::LoggingLevel;
    use crate::monitor::{Monitor, ProfilingStatus};
    use crate::test_utils::{
        Enemy, Player, game_assembly, monitor_with, plain_settings, sync_monitor, sync_settings,
    };

    const FRAME: Duration = Duration::from_millis(16);
    const PAST_INTERVAL: Duration = Duration::from_millis(51);

    fn names(monitor: &Monitor) -> Vec<(String, bool)> {
        monitor
            .snapshot()
            .into_iter()
            .map(|view| (format!("{}/{}", view.target_name, view.name), view.enabled))
            .collect()
    }

    fn enabled(monitor: &Monitor) -> Vec<String> {
        names(monitor)
            .into_iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name)
            .collect()
    }

    // ============================================================================
    // Profiling
    // ============================================================================

    #[test]
    fn test_sync_profiling_installs_statics_and_opens_display() {
        let monitor = sync_monitor();

        assert_eq!(monitor.status(), ProfilingStatus::Ready);
        assert_eq!(monitor.profiles().len(), 12);
        assert_eq!(monitor.stats().profiles_created, 12);
        assert!(monitor.is_visible());

        // Static units exist without any registered target
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "Frame Count");
        assert_eq!(snapshot[0].target_name, "World");
        // Opening the display refreshed them
        assert_eq!(snapshot[0].state, "Frame Count: 0");
        assert_eq!(monitor.scheduler().update_ticks(), 1);
        assert_eq!(monitor.scheduler().validation_ticks(), 1);
    }

    #[test]
    fn test_async_profiling_queues_early_targets() {
        let mut settings = plain_settings();
        settings.general.async_profiling = true;
        let mut monitor = Monitor::new(Arc::new(settings));

        monitor.begin_profiling(vec![game_assembly()]).unwrap();
        let player = Rc::new(Player::new("Hero", 30.0));
        assert!(monitor.register_target(&player, "Hero").is_empty());

        // Dropped before install: never receives units
        let ghost = Rc::new(Player::new("Ghost", 1.0));
        monitor.register_target(&ghost, "Ghost");
        drop(ghost);

        let deadline = Instant::now() + Duration::from_secs(10);
        while monitor.status() != ProfilingStatus::Ready {
            assert!(Instant::now() < deadline, "profiling did not finish");
            monitor.tick(FRAME);
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(monitor.snapshot().len(), 2 + 8);
        assert!(monitor.find("Health", "Hero").is_some());
        assert!(monitor.find("Health", "Ghost").is_none());
    }

    #[test]
    fn test_wait_for_profiling() {
        let mut settings = plain_settings();
        settings.general.open_display_on_load = false;
        let mut monitor = Monitor::new(Arc::new(settings));

        monitor.begin_profiling(vec![game_assembly()]).unwrap();
        monitor.wait_for_profiling().unwrap();
        assert_eq!(monitor.status(), ProfilingStatus::Ready);
        assert!(!monitor.is_visible());
        assert_eq!(monitor.scheduler().update_ticks(), 0);
    }

    #[test]
    fn test_monitoring_disabled_creates_nothing() {
        let mut settings = sync_settings();
        settings.general.enable_monitoring = false;
        let mut monitor = monitor_with(settings);

        let player = Rc::new(Player::new("Hero", 30.0));
        assert!(monitor.register_target(&player, "Hero").is_empty());
        assert_eq!(monitor.status(), ProfilingStatus::Disabled);
        assert!(monitor.profiles().is_empty());
        assert!(monitor.snapshot().is_empty());
    }

    #[test]
    fn test_fatal_scan_error_fails_profiling() {
        let mut settings = sync_settings();
        settings.logging.bad_image = LoggingLevel::Exception;
        let mut monitor = Monitor::new(Arc::new(settings));

        let result = monitor.begin_profiling(vec![crate::reflection::Assembly::unreadable(
            "Broken", "bad header",
        )]);
        assert!(matches!(result, Err(MonitorError::BadImage { .. })));
        assert_eq!(monitor.status(), ProfilingStatus::Failed);
    }

    #[test]
    fn test_canceled_profiling_drops_queued_targets() {
        let mut settings = plain_settings();
        settings.general.async_profiling = true;
        let mut monitor = Monitor::new(Arc::new(settings));

        let player = Rc::new(Player::new("Hero", 30.0));
        monitor.register_target(&player, "Hero");
        assert_eq!(monitor.pending_targets(), 1);

        monitor.finish_profiling(Err(MonitorError::OperationCanceled)).unwrap();
        assert_eq!(monitor.status(), ProfilingStatus::Canceled);
        assert_eq!(monitor.pending_targets(), 0);
        assert_eq!(monitor.logger().count(ErrorCategory::OperationCanceled), 1);

        // Not queued until profiling starts again
        monitor.register_target(&player, "Hero");
        assert_eq!(monitor.pending_targets(), 0);
        monitor.begin_profiling(vec![game_assembly()]).unwrap();
        monitor.register_target(&player, "Hero");
        monitor.wait_for_profiling().unwrap();
        assert_eq!(monitor.status(), ProfilingStatus::Ready);
        assert!(monitor.find("Health", "Hero").is_some());
        assert_eq!(monitor.pending_targets(), 0);
    }

    #[test]
    fn test_reprofiling_keeps_one_unit_per_static_member() {
        let mut monitor = sync_monitor();
        let handlers = crate::test_utils::ON_SPAWN.with(|event| event.len());
        assert_eq!(handlers, 1);

        monitor.begin_profiling(vec![game_assembly()]).unwrap();
        assert_eq!(monitor.status(), ProfilingStatus::Ready);
        assert_eq!(monitor.profiles().len(), 12);

        let statics: Vec<String> = monitor.snapshot().into_iter().map(|view| view.name).collect();
        assert_eq!(statics, ["Frame Count", "On Spawn"]);
        assert_eq!(crate::test_utils::ON_SPAWN.with(|event| event.len()), handlers);
    }

    // ============================================================================
    // Registration
    // ============================================================================

    #[test]
    fn test_one_profile_per_member_regardless_of_instances() {
        let mut monitor = sync_monitor();
        let players: Vec<_> = (0..5)
            .map(|i| Rc::new(Player::new(&format!("P{}", i), 10.0)))
            .collect();
        for (i, player) in players.iter().enumerate() {
            let ids = monitor.register_target(player, &format!("P{}", i));
            assert_eq!(ids.len(), 8);
        }

        assert_eq!(monitor.profiles().len(), 12);
        assert_eq!(monitor.snapshot().len(), 2 + 5 * 8);

        let p0 = monitor.find("Health", "P0").unwrap();
        let p1 = monitor.find("Health", "P1").unwrap();
        assert!(Arc::ptr_eq(
            monitor.unit(p0).unwrap().profile(),
            monitor.unit(p1).unwrap().profile()
        ));
    }

    #[test]
    fn test_double_registration_returns_existing_units() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));

        let first = monitor.register_target(&player, "Hero");
        let second = monitor.register_target(&player, "Hero");
        assert_eq!(first, second);
        assert_eq!(monitor.snapshot().len(), 2 + 8);
    }

    #[test]
    fn test_unregister_removes_units_and_handlers() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        let enemy = Rc::new(Enemy::new(5.0, true));

        monitor.register_target(&player, "Hero");
        monitor.register_target(&enemy, "Boss");
        assert_eq!(player.on_damage.len(), 1);

        assert_eq!(monitor.unregister_target(&player), 8);
        assert_eq!(player.on_damage.len(), 0);
        assert_eq!(monitor.unregister_target(&player), 0);
        assert_eq!(monitor.snapshot().len(), 2 + 2);
    }

    // ============================================================================
    // Ticking
    // ============================================================================

    #[test]
    fn test_tick_refreshes_at_interval() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        let health = monitor.find("Health", "Hero").unwrap();

        // Not refreshed until the next tick
        assert_eq!(monitor.unit(health).unwrap().state(), "");

        assert!(!monitor.tick(FRAME));
        assert!(monitor.tick(PAST_INTERVAL));
        assert_eq!(monitor.unit(health).unwrap().state(), "Health: 10.00");

        player.health.set(4.0);
        assert!(!monitor.tick(FRAME));
        assert_eq!(monitor.unit(health).unwrap().state(), "Health: 10.00");
        assert!(monitor.tick(PAST_INTERVAL));
        assert_eq!(monitor.unit(health).unwrap().state(), "Health: 4.00");
    }

    #[test]
    fn test_hidden_display_does_no_work() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        monitor.set_visible(false);

        let updates = monitor.scheduler().update_ticks();
        for _ in 0..20 {
            assert!(!monitor.tick(PAST_INTERVAL));
        }
        assert_eq!(player.pings.get(), 0);
        assert_eq!(monitor.scheduler().update_ticks(), updates);

        // Becoming visible resynchronizes immediately
        monitor.set_visible(true);
        assert_eq!(player.pings.get(), 1);
        assert_eq!(monitor.scheduler().update_ticks(), updates + 1);
        assert_eq!(monitor.scheduler().validation_ticks(), updates + 1);
    }

    #[test]
    fn test_value_changed_fires_once_per_change() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        let level = monitor.find("Level", "Hero").unwrap();

        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        assert!(monitor.on_value_changed(level, move |_| counter.set(counter.get() + 1)));

        for _ in 0..5 {
            monitor.tick(PAST_INTERVAL);
        }
        assert_eq!(changes.get(), 1);

        player.level.set(2);
        monitor.tick(PAST_INTERVAL);
        monitor.tick(PAST_INTERVAL);
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_failing_unit_is_disabled_others_continue() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        let fragile = monitor.find("Fragile", "Hero").unwrap();
        let health = monitor.find("Health", "Hero").unwrap();

        player.fail.set(true);
        player.health.set(9.0);
        monitor.tick(PAST_INTERVAL);

        assert!(!monitor.unit(fragile).unwrap().is_enabled());
        assert!(!monitor.scheduler().active().contains(fragile));
        assert_eq!(monitor.unit(health).unwrap().state(), "Health: 9.00");
        assert_eq!(monitor.logger().count(ErrorCategory::Unknown), 1);

        // Stays out of the tick
        monitor.tick(PAST_INTERVAL);
        assert_eq!(monitor.logger().count(ErrorCategory::Unknown), 1);
    }

    #[test]
    fn test_destroyed_target_units_are_removed() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        assert_eq!(monitor.snapshot().len(), 10);

        drop(player);
        monitor.tick(PAST_INTERVAL);
        assert_eq!(monitor.snapshot().len(), 2);
        assert_eq!(monitor.logger().count(ErrorCategory::Unknown), 0);
    }

    #[test]
    fn test_set_value_through_monitor() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        let health = monitor.find("Health", "Hero").unwrap();

        monitor.set_value(health, 55.0f32).unwrap();
        assert_eq!(player.health.get(), 55.0);
        assert_eq!(monitor.unit(health).unwrap().state(), "Health: 55.00");

        let level = monitor.find("Level", "Hero").unwrap();
        assert!(matches!(
            monitor.set_value(level, 3),
            Err(MonitorError::NotSettable(_))
        ));
    }

    // ============================================================================
    // Filtering
    // ============================================================================

    fn filtered_monitor() -> (Monitor, Rc<Player>, Rc<Enemy>) {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        let enemy = Rc::new(Enemy::new(5.0, true));
        monitor.register_target(&player, "Hero");
        monitor.register_target(&enemy, "Boss");
        (monitor, player, enemy)
    }

    #[test]
    fn test_filter_clause_order() {
        let (mut monitor, _player, _enemy) = filtered_monitor();

        monitor.apply_filter("Health&!Health");
        assert!(!enabled(&monitor).contains(&"Hero/Health".to_string()));

        monitor.apply_filter("!Health&Health");
        assert!(enabled(&monitor).contains(&"Hero/Health".to_string()));
    }

    #[test]
    fn test_absolute_filter() {
        let (mut monitor, _player, _enemy) = filtered_monitor();

        monitor.apply_filter("@Scaled");
        assert_eq!(enabled(&monitor), vec!["Hero/Scaled Health"]);

        // Names keep their spaces when matched
        monitor.apply_filter("@ScaledHealth");
        assert!(enabled(&monitor).is_empty());

        monitor.apply_filter("@Health");
        assert_eq!(enabled(&monitor), vec!["Hero/Health", "Boss/Health"]);
    }

    #[test]
    fn test_tag_filter() {
        let (mut monitor, _player, _enemy) = filtered_monitor();

        monitor.apply_filter("$boss");
        assert_eq!(enabled(&monitor), vec!["Boss/Boss"]);

        monitor.apply_filter("$");
        assert!(enabled(&monitor).is_empty());
    }

    #[test]
    fn test_general_filter_matches_target_and_declared_tags() {
        let (mut monitor, _player, _enemy) = filtered_monitor();

        monitor.apply_filter("Enemy");
        assert_eq!(enabled(&monitor), vec!["Boss/Health", "Boss/Boss"]);

        monitor.apply_filter("Static");
        assert_eq!(enabled(&monitor), vec!["World/Frame Count", "World/On Spawn"]);

        monitor.apply_filter("!Hero");
        assert_eq!(
            enabled(&monitor),
            vec!["World/Frame Count", "World/On Spawn", "Boss/Health", "Boss/Boss"]
        );

        // A negated clause enables everything it does not match
        monitor.apply_filter("!Hero&!World");
        assert_eq!(enabled(&monitor).len(), 8 + 2);
    }

    #[test]
    fn test_filter_gates_ticking_and_suspends_validation() {
        let (mut monitor, player, _enemy) = filtered_monitor();
        let validations = monitor.scheduler().validation_ticks();

        monitor.apply_filter("Ping");
        assert_eq!(monitor.scheduler().active().len(), 1);
        assert!(!monitor.scheduler().validation_active());

        monitor.tick(PAST_INTERVAL);
        assert_eq!(player.pings.get(), 1);
        assert_eq!(monitor.scheduler().validation_ticks(), validations);

        // New units follow the active filter
        let other = Rc::new(Player::new("Other", 1.0));
        monitor.register_target(&other, "Other");
        assert_eq!(monitor.scheduler().active().len(), 2);

        monitor.reset_filter();
        assert_eq!(monitor.active_filter(), None);
        assert!(monitor.scheduler().validation_active());
        assert_eq!(monitor.scheduler().active().len(), monitor.snapshot().len());
        assert!(names(&monitor).iter().all(|(_, enabled)| *enabled));
    }

    #[test]
    fn test_reset_without_filter_is_noop() {
        let (mut monitor, _player, _enemy) = filtered_monitor();
        let before = names(&monitor);

        monitor.reset_filter();
        assert_eq!(names(&monitor), before);

        monitor.apply_filter("   ");
        assert_eq!(monitor.active_filter(), None);
        assert_eq!(names(&monitor), before);
    }

    // ============================================================================
    // Events and Shutdown
    // ============================================================================

    #[test]
    fn test_event_unit_reports_subscribers() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");
        let event = monitor.find("On Damage", "Hero").unwrap();

        player.on_damage.subscribe(|_| {});
        player.on_damage.subscribe(|_| {});
        player.take_damage(1.0);
        monitor.tick(PAST_INTERVAL);

        assert_eq!(
            monitor.unit(event).unwrap().state(),
            "On Damage Subscriber:2 Invokes: 1"
        );
    }

    #[test]
    fn test_shutdown_drops_everything() {
        let mut monitor = sync_monitor();
        let player = Rc::new(Player::new("Hero", 10.0));
        monitor.register_target(&player, "Hero");

        monitor.shutdown();
        assert_eq!(monitor.status(), ProfilingStatus::ShutDown);
        assert!(monitor.snapshot().is_empty());
        assert!(monitor.profiles().is_empty());
        assert!(monitor.instantiations().is_empty());
        assert_eq!(player.on_damage.len(), 0);

        assert!(!monitor.tick(PAST_INTERVAL));
        assert!(monitor.register_target(&player, "Hero").is_empty());
        monitor.begin_profiling(vec![game_assembly()]).unwrap();
        assert!(monitor.profiles().is_empty());
    }
}
