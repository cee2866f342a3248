//! Algorithm comparison example.
//!
//! Run with:
//! ```
//! cargo run --example algorithms --features all-algorithms
//! ```

use std::time::Duration;

use skp_admit::{new_limiter, Algorithm, CancellationToken, Limiter, RateLimitConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RateLimitConfig::new(5)
        .with_capacity(3)
        .with_burst(3)
        .with_window(Duration::from_secs(1))
        .with_metrics(true);

    println!("=== Algorithm Comparison Demo ===\n");
    println!("Rate: 5 per second, capacity/burst: 3\n");

    for algorithm in Algorithm::ALL {
        let limiter = new_limiter(&config.clone().with_algorithm(algorithm))?;
        test_algorithm(limiter.as_ref());
    }

    println!("\n=== Waiting for admission ===\n");

    let limiter = new_limiter(&config.clone().with_algorithm(Algorithm::NestedWindow))?;
    let cancel = CancellationToken::new();
    limiter.allow_n(3);

    let start = tokio::time::Instant::now();
    limiter.wait(&cancel).await?;
    println!("nested_window admitted after {:?}", start.elapsed());

    cancel.cancel();
    match limiter.wait(&cancel).await {
        Ok(()) => println!("unexpected admission"),
        Err(err) => println!("cancelled wait: {}", err),
    }
    println!("{:#?}", limiter.get_metrics());

    println!("\n=== Algorithm Characteristics ===\n");
    println!("| Algorithm      | Memory  | Burst Handling | Best For                  |");
    println!("|----------------|---------|----------------|---------------------------|");
    println!("| Token Bucket   | Low     | Good           | Bursty traffic            |");
    println!("| Fixed Window   | Low     | Poor           | Simple use cases          |");
    println!("| Sliding Window | O(rate) | Excellent      | Precision critical        |");
    println!("| Nested Window  | Low     | Capped         | Sustained + burst ceiling |");

    Ok(())
}

fn test_algorithm(limiter: &dyn Limiter) {
    print!("{:15} | ", limiter.name());

    let results: Vec<_> = (0..8)
        .map(|_| if limiter.allow() { "✅" } else { "❌" })
        .collect();

    let metrics = limiter.get_metrics();
    println!(
        "{} | denied {}/{}",
        results.join(" "),
        metrics.denied_requests,
        metrics.total_requests
    );
}
