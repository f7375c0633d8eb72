// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Strand Sandbox
// A fixed-step game loop running a scripted stage: waves of fairies, a boss
// that only shows up once the waves are cleared, and a player that shoots.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use strand_core::{BoxedObject, SchedulerConfig};
use strand_data::ObjectArena;
use strand_sched::{Event, Scheduler, TaskContext};

#[derive(Parser)]
#[command(author, version, about = "Runs a scripted stage on the Strand scheduler", long_about = None)]
struct Cli {
    /// Number of ticks to simulate
    #[arg(long, default_value_t = 900)]
    ticks: u32,
    /// Scheduler config file (.json or .ron)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print scheduler stats every N ticks (0 disables)
    #[arg(long, default_value_t = 60)]
    stats_every: u32,
}

#[derive(Debug, Clone, Copy)]
struct Fairy {
    x: f32,
    y: f32,
    hp: i32,
}

/// Shared world state handed to every script.
#[derive(Clone)]
struct Stage {
    fairies: ObjectArena<Fairy>,
    waves_cleared: Event,
    boss_defeated: Event,
}

async fn fairy_script(ctx: TaskContext, (stage, handle): (Stage, BoxedObject)) {
    ctx.bind(Some(stage.fairies.weak(handle))).await;
    loop {
        stage.fairies.with_mut(handle, |fairy| {
            fairy.y += 1.5;
            fairy.x += (fairy.y * 0.05).sin();
        });
        ctx.yield_now().await;
    }
}

async fn wave_script(ctx: TaskContext, (stage, wave): (Stage, u32)) {
    for i in 0..4 {
        let handle = stage.fairies.spawn(Fairy {
            x: 40.0 * i as f32,
            y: 0.0,
            hp: 3 + wave as i32,
        });
        ctx.spawn_subtask(format!("fairy w{wave}#{i}"), fairy_script, (stage.clone(), handle))
            .await;
        ctx.wait(10).await;
    }
    // The wave ends when every fairy it spawned is gone.
    let frames = ctx.wait_subtasks().await;
    log::info!("Wave {wave} cleared after {frames} more frames");
}

async fn stage_script(ctx: TaskContext, stage: Stage) {
    for wave in 1..=3 {
        let runner = ctx
            .spawn_subtask(format!("wave {wave}"), wave_script, (stage.clone(), wave))
            .await;
        if let Some(done) = ctx.finished_event(runner) {
            ctx.wait_event_or_die(&done).await;
        }
        ctx.wait(30).await;
    }
    ctx.signal(&stage.waves_cleared).await;
}

async fn boss_script(ctx: TaskContext, stage: Stage) {
    let handle = stage.fairies.spawn(Fairy {
        x: 120.0,
        y: 40.0,
        hp: 60,
    });
    log::info!("Boss enters");
    ctx.bind(Some(stage.fairies.weak(handle))).await;
    ctx.set_finalizer(|| log::info!("Boss script finalized"));

    let mut phase = 0;
    loop {
        phase += 1;
        log::debug!("Boss phase {phase}");
        ctx.wait(20).await;
    }
}

/// The player fires at the lowest fairy every few ticks.
async fn player_script(ctx: TaskContext, stage: Stage) {
    let mut shots = 0u32;
    loop {
        ctx.wait(3).await;
        let target = stage
            .fairies
            .handles()
            .into_iter()
            .filter_map(|h| stage.fairies.with(h, |f| (h, f.y)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h);
        let Some(target) = target else {
            continue;
        };
        shots += 1;
        let dead = stage
            .fairies
            .with_mut(target, |f| {
                f.hp -= 1;
                f.hp <= 0
            })
            .unwrap_or(false);
        if dead {
            let fairy = stage.fairies.despawn(target);
            log::debug!("Shot #{shots} destroyed {target} ({fairy:?})");
            if stage.fairies.is_empty() && stage.waves_cleared.signaled_count() > 0 {
                ctx.signal_once(&stage.boss_defeated).await;
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("failed to load scheduler config {}", path.display())),
        None => Ok(SchedulerConfig::default()),
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let sched = Scheduler::with_config(config);
    let stage = Stage {
        fairies: ObjectArena::with_capacity(32),
        waves_cleared: sched.new_event(),
        boss_defeated: sched.new_event(),
    };

    sched.new_task("stage", stage_script, stage.clone());
    sched.new_task("player", player_script, stage.clone());
    sched.new_task_when("boss", &stage.waves_cleared, boss_script, stage.clone());
    sched.new_task_after(
        "ending",
        &stage.boss_defeated,
        |_ctx, ()| async move {
            log::info!("Stage complete");
        },
        (),
    );

    for tick in 1..=cli.ticks {
        sched.run_tasks();
        if cli.stats_every != 0 && tick % cli.stats_every == 0 {
            log::info!(
                "tick {tick}: {} fairies, {}",
                stage.fairies.len(),
                sched.stats()
            );
        }
        if stage.boss_defeated.signaled_count() > 0 {
            log::info!("Boss defeated at tick {tick}");
            break;
        }
    }

    sched.finish();
    log::info!("Scheduler shut down: {}", sched.stats());
    Ok(())
}
