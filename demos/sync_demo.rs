//! Runs the sync timer against a host-thread alarm: five firings of the
//! beacon schedule, with a period shift requested mid-run the way the
//! receiver corrects for measured drift against the transmitter.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lora_sync::radio::{airtime, RadioParameters};
use lora_sync::timer::{Alarm, SyncTimer, TimerShared};

static SYNC: TimerShared = TimerShared::new();

/// Periodic alarm backed by a host thread, standing in for the hardware
/// alarm a firmware build would wire up.
struct ThreadAlarm {
    stop: Option<Arc<AtomicBool>>,
    armed_at: Instant,
    period_us: u64,
}

impl ThreadAlarm {
    fn new() -> Self {
        Self {
            stop: None,
            armed_at: Instant::now(),
            period_us: 0,
        }
    }
}

impl Alarm for ThreadAlarm {
    type Error = ();

    fn start_periodic(&mut self, period_us: u64) -> Result<(), ()> {
        self.cancel()?;
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();
        thread::spawn(move || {
            while !stopped.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_micros(period_us));
                if stopped.load(Ordering::Relaxed) {
                    break;
                }
                // The "interrupt": only the wake is raised here.
                SYNC.on_alarm();
            }
        });
        self.stop = Some(stop);
        self.armed_at = Instant::now();
        self.period_us = period_us;
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), ()> {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.stop.is_some()
    }

    fn time_until_fire_us(&self) -> u64 {
        if self.stop.is_none() {
            return 0;
        }
        let elapsed = self.armed_at.elapsed().as_micros() as u64 % self.period_us;
        self.period_us - elapsed
    }
}

fn main() {
    let params = RadioParameters::default();
    println!(
        "16-byte beacon occupies the air for {} us",
        airtime::time_on_air_us(&params, 16)
    );

    let count = Cell::new(0u32);
    let mut timer = SyncTimer::new(ThreadAlarm::new(), &SYNC);
    timer.start(200_000, || count.set(count.get() + 1)).unwrap();

    // The worker loop a firmware build would run.
    while count.get() < 5 {
        if timer.process().unwrap() {
            println!(
                "fired #{} (period {} us, next in {} us)",
                count.get(),
                timer.current_period_us(),
                timer.time_until_fire_us()
            );
            if count.get() == 3 {
                println!("drift measured, resyncing to 250000 us");
                timer.resync(250_000).unwrap();
            }
        }
        thread::sleep(Duration::from_millis(5));
    }

    timer.stop().unwrap();
    println!("final period {} us", timer.current_period_us());
}
