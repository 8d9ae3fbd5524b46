use kvtx::command::CmdLine;
use kvtx::engine::Engine;
use kvtx::persistence::aof::MemorySink;
use std::sync::Arc;
use std::time::Instant;

fn start_engine() -> Arc<Engine> {
    Arc::new(Engine::new(Box::new(MemorySink::new())).unwrap())
}

async fn run(engine: &Engine, cmd: CmdLine) {
    let reply = engine.execute(cmd).await;
    assert!(!reply.is_error(), "unexpected error reply: {reply:?}");
}

async fn bench_set_get(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        run(engine, CmdLine::new("SET").arg(format!("bench_key_{i}")).arg(format!("value_{i}"))).await;
    }
    let set_ops = iterations as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    for i in 0..iterations {
        run(engine, CmdLine::new("GET").arg(format!("bench_key_{i}"))).await;
    }
    let get_ops = iterations as f64 / start.elapsed().as_secs_f64();

    (set_ops, get_ops)
}

async fn bench_hset_hget(engine: &Engine, iterations: usize) -> (f64, f64) {
    let start = Instant::now();
    for i in 0..iterations {
        run(
            engine,
            CmdLine::new("HSET").arg("bench_hash").arg(format!("field_{i}")).arg(format!("value_{i}")),
        )
        .await;
    }
    let hset_ops = iterations as f64 / start.elapsed().as_secs_f64();

    let start = Instant::now();
    for i in 0..iterations {
        run(engine, CmdLine::new("HGET").arg("bench_hash").arg(format!("field_{i}"))).await;
    }
    let hget_ops = iterations as f64 / start.elapsed().as_secs_f64();

    (hset_ops, hget_ops)
}

async fn bench_hincrby(engine: &Engine, iterations: usize) -> f64 {
    let start = Instant::now();
    for _ in 0..iterations {
        run(engine, CmdLine::new("HINCRBY").arg("bench_counter").arg("n").arg("1")).await;
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

/// 100-command transactions, each rolled back by a failing last command.
async fn bench_rollback(engine: &Engine, iterations: usize) -> f64 {
    let batch_size = 100;
    let start = Instant::now();
    for batch in 0..(iterations / batch_size) {
        let mut cmds: Vec<CmdLine> = (0..batch_size - 1)
            .map(|i| CmdLine::new("HSET").arg("rb_hash").arg(format!("f_{batch}_{i}")).arg("v"))
            .collect();
        cmds.push(CmdLine::new("HINCRBY").arg("rb_hash").arg(format!("f_{batch}_0")).arg("1"));
        let outcome = engine.run_transaction(cmds).await;
        assert!(!outcome.committed());
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

async fn bench_concurrent_disjoint(engine: Arc<Engine>, iterations: usize) -> f64 {
    let tasks = 8;
    let start = Instant::now();
    let handles: Vec<_> = (0..tasks)
        .map(|t| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..iterations / tasks {
                    run(&engine, CmdLine::new("HSET").arg(format!("task_{t}")).arg(format!("f_{i}")).arg("v")).await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    iterations as f64 / start.elapsed().as_secs_f64()
}

#[tokio::main]
async fn main() {
    let engine = start_engine();
    let iterations = 10_000;

    println!("=== kvtx Benchmark ({iterations} operations) ===\n");

    let (set_ops, get_ops) = bench_set_get(&engine, iterations).await;
    println!("SET:      {set_ops:>10.0} ops/sec");
    println!("GET:      {get_ops:>10.0} ops/sec");

    let (hset_ops, hget_ops) = bench_hset_hget(&engine, iterations).await;
    println!("HSET:     {hset_ops:>10.0} ops/sec");
    println!("HGET:     {hget_ops:>10.0} ops/sec");

    let incr_ops = bench_hincrby(&engine, iterations).await;
    println!("HINCRBY:  {incr_ops:>10.0} ops/sec");

    let rollback_ops = bench_rollback(&engine, iterations).await;
    println!("ROLLBACK: {rollback_ops:>10.0} cmds/sec (100-cmd aborted transactions)");

    let concurrent_ops = bench_concurrent_disjoint(engine.clone(), iterations).await;
    println!("PARALLEL: {concurrent_ops:>10.0} ops/sec (8 tasks, disjoint keys)");

    println!("\n=== Done ===");
}
