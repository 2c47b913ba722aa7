//! Diagnostic: run a short synthetic flight through `Ekf14` and print
//! before/after state at each stage.
//!
//! `RUST_LOG=warn` surfaces anomalies (degenerate quaternion, non-finite
//! covariance, skipped measurements) if any are raised.

use ins14_ekf::Ekf14;

const GRAVITY: f64 = 9.80665;

fn print_state(label: &str, ekf: &Ekf14) {
    let s = ekf.get_state();
    println!("{label}");
    println!(
        "  pos  ({:.3}, {:.3}, {:.3}) m",
        s.pos[0], s.pos[1], s.pos[2]
    );
    println!(
        "  vel  ({:.3}, {:.3}, {:.3}) m/s",
        s.vel[0], s.vel[1], s.vel[2]
    );
    println!(
        "  quat ({:.4}, {:.4}, {:.4}, {:.4})",
        s.quat[0], s.quat[1], s.quat[2], s.quat[3]
    );
    println!(
        "  gyro_bias ({:.5}, {:.5}, {:.5}) rad/s, accel_bias_z {:.5} m/s^2",
        s.gyro_bias[0], s.gyro_bias[1], s.gyro_bias[2], s.accel_bias[2]
    );
}

fn main() {
    env_logger::init();

    let mut ekf = Ekf14::init();
    print_state("=== init ===", &ekf);

    println!("\n=== static hold, 200 steps @ 5ms ===");
    for _ in 0..200 {
        ekf.predict([0.0, 0.0, 0.0], [0.0, 0.0, -GRAVITY], 0.005);
        ekf.predict_covariance(0.005);
    }
    print_state("after static hold", &ekf);

    println!("\n=== GPS fix: pos (12, -4, 0) ===");
    ekf.correct(
        [1.0, 0.0, 0.0],
        [12.0, -4.0, 0.0],
        [0.0, 0.0, 0.0],
        0.0,
        0b0000_0111,
    );
    print_state("after GPS fix", &ekf);

    println!("\n=== yaw-rate turn, 100 steps @ 10ms, 0.2 rad/s ===");
    for _ in 0..100 {
        ekf.predict([0.0, 0.0, 0.2], [0.0, 0.0, -GRAVITY], 0.01);
        ekf.predict_covariance(0.01);
    }
    print_state("after yaw turn", &ekf);

    let counts = ekf.anomaly_counts();
    println!("\n=== anomaly counts ===");
    println!("{counts:?}");
}
