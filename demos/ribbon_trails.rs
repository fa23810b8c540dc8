//! # Ribbon Trails
//!
//! Builds a few frames of swirling sparks with trailing ribbons and a smoke
//! billboard stage, then prints how the geometry was batched.
//!
//! No window is opened; the mesh is built on the CPU only.
//!
//! Run with: `RUST_LOG=debug cargo run --example ribbon_trails`

use particle_mesh::prelude::*;

const SPARKS: usize = 256;
const TRAILS: usize = 6;
const SMOKE: usize = 64;

fn spark_pivots(index: usize, time: f32) -> Vec<Trail> {
    let phase = index as f32 / SPARKS as f32 * std::f32::consts::TAU;
    let color = pack_rgba(Vec4::new(1.0, 0.6 + 0.4 * phase.sin().abs(), 0.2, 1.0));
    (0..=TRAILS)
        .map(|p| {
            let t = time - p as f32 * 0.05;
            let radius = 2.0 + (phase * 3.0).sin();
            let angle = t + phase;
            let position = Vec3::new(radius * angle.cos(), radius * angle.sin(), t.sin() + 1.0);
            Trail::new(position, 0.08 * (1.0 - p as f32 / (TRAILS + 1) as f32)).with_color(color)
        })
        .collect()
}

fn main() -> Result<(), MeshError> {
    env_logger::init();

    let fire = MaterialHandle::new(1);
    let smoke = MaterialHandle::new(2);
    let stages = [
        Stage::new(SPARKS, Orientation::Aimed, fire).with_trails(TRAILS),
        Stage::new(SPARKS, Orientation::View, fire),
        Stage::new(SMOKE, Orientation::ViewAxisZ, smoke),
    ];

    let mut particles = [
        ParticleBuffer::new(SPARKS, TRAILS),
        ParticleBuffer::new(SPARKS, 0),
        ParticleBuffer::new(SMOKE, 0),
    ];
    let grey = pack_rgba(Vec4::new(0.5, 0.5, 0.5, 0.4));

    let mut buffers = TransientBuffers::new(4 << 20, 2 << 20);
    let mut mesh = ParticleMesh::new(MeshConfig::new().with_max_trails(TRAILS));
    let view = ViewTransform::looking_at(Vec3::new(8.0, -6.0, 4.0), Vec3::ZERO).unwrap_or_default();
    let ctx = FrameContext::new(EntityTransform::default(), view, MaterialHandle::default());

    for frame in 0..5 {
        let time = frame as f32 * 0.1;
        let [sparks, heads, puffs] = &mut particles;
        for i in 0..SPARKS {
            let pivots = spark_pivots(i, time);
            sparks.spawn(i, &pivots);
            heads.spawn(i, &pivots[..1]);
        }
        for i in 0..SMOKE {
            let puff = Trail::new(Vec3::new(0.0, 0.0, i as f32 * 0.05 + time), 0.6)
                .with_angle(i as f32 * 17.0)
                .with_color(grey);
            puffs.spawn(i, &[puff]);
        }
        // Half the smoke fades out after the second frame.
        if frame >= 2 {
            for i in (0..SMOKE).step_by(2) {
                puffs.kill(i);
            }
        }

        buffers.begin_frame();
        mesh.build_frame(&ctx, &buffers, &stages, &particles)?;

        log::info!("frame {frame}: {}", mesh.stats());
        for call in mesh.draw_calls() {
            log::info!(
                "  material {} indices {:?}",
                call.material.id(),
                call.index_range()
            );
        }
    }

    Ok(())
}
