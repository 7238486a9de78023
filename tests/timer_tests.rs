use std::time::Duration;

use webserv::timer::TimerHeap;

#[test]
fn idle_timeout_scenario_expires_and_is_removed() {
    let mut timer = TimerHeap::new();
    timer.add(7, Duration::from_millis(10));

    std::thread::sleep(Duration::from_millis(20));
    let (expired, wait) = timer.next_tick_ms();

    assert_eq!(expired, vec![7]);
    assert_eq!(wait, None);
    assert!(timer.is_empty());
}

#[test]
fn activity_extends_deadline_past_original_expiry() {
    let mut timer = TimerHeap::new();
    timer.add(1, Duration::from_millis(10));
    timer.adjust(1, Duration::from_millis(200));

    std::thread::sleep(Duration::from_millis(15));
    let (expired, _) = timer.next_tick_ms();
    assert!(expired.is_empty(), "adjusted deadline must not have fired yet");
}
