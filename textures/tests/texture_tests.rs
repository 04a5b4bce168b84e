//! Texture integration tests.
//!
//! Tests are parameterized using `rstest` to run against every device. Tests
//! that inspect recorded device commands run on the dummy device only.
//!
//! ```bash
//! cargo test --test texture_tests
//! cargo test --test texture_tests --features wgpu-backend
//! ```

mod common;

use std::io::Cursor;

use rstest::rstest;

use common::{checkerboard, copy_rows_out, generate_test_pattern, Backend, TestContext};
use redlilium_textures::device::{DeviceCapabilities, DeviceQueue, RecordedCommand};
use redlilium_textures::error::VariableRateViolation;
use redlilium_textures::{
    CreateFlags, DdsxHeader, DdsxLoadOptions, Extent3d, FilterMode, LockFlags, LockState, Offset3d,
    ResizeRequest, ShaderStage, SubRegionCopy, SubresourceData, TextureCreateInfo, TextureError,
    TextureFormat,
};

/// Packed data for every mip of an A8R8G8B8 2D texture, one pattern per mip.
fn mip_chain(width: u32, height: u32, levels: u32) -> Vec<Vec<u8>> {
    (0..levels)
        .map(|mip| {
            let w = (width >> mip).max(1) as usize;
            let h = (height >> mip).max(1) as usize;
            generate_test_pattern(w * h * 4, mip as u8 * 31)
        })
        .collect()
}

fn chain_data(width: u32, chain: &[Vec<u8>]) -> Vec<SubresourceData<'_>> {
    chain
        .iter()
        .enumerate()
        .map(|(mip, bytes)| SubresourceData::new(bytes, (width >> mip).max(1) * 4))
        .collect()
}

// ============================================================================
// Creation Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_automatic_mip_count(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let plain = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(256, 256, CreateFlags::empty()), None)
        .unwrap();
    assert_eq!(ctx.textures.info(plain, 0).unwrap().mip_levels, 7);

    let target = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(256, 256, CreateFlags::RENDER_TARGET), None)
        .unwrap();
    assert_eq!(ctx.textures.info(target, 0).unwrap().mip_levels, 9);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_checkerboard_with_padded_pitch(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let row_pitch = 256 * 4 + 64;
    let pixels = checkerboard(256, 256, 32, row_pitch);
    let data = [SubresourceData::new(&pixels, row_pitch as u32)];
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(256, 256, CreateFlags::empty())
                .with_mip_levels(1)
                .with_label("checkerboard"),
            Some(&data),
        )
        .unwrap();

    let read = ctx.read_level(handle, 0, 256 * 4, 256);
    assert_eq!(read, copy_rows_out(&pixels, row_pitch, 256 * 4, 256));
    // Top-left cell is white, the next one black.
    assert_eq!(&read[0..4], &[0xff; 4]);
    assert_eq!(&read[32 * 4..32 * 4 + 4], &[0x00, 0x00, 0x00, 0xff]);
}

#[test]
fn test_variable_rate_failure_allocates_nothing() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let flags = CreateFlags::VARIABLE_RATE.with_format(TextureFormat::R8Ui);
    let result = ctx.textures.create(
        &TextureCreateInfo::new_2d(64, 64, flags).with_mip_levels(2),
        None,
    );
    assert_eq!(
        result,
        Err(TextureError::VariableRate(VariableRateViolation::MipLevels(2)))
    );
    assert_eq!(ctx.dummy().images_created(), 0);
    assert!(ctx.textures.is_empty());
}

#[test]
fn test_staging_failure_releases_image() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    ctx.dummy().fail_next_staging(1);
    let result = ctx.textures.create(
        &TextureCreateInfo::new_2d(32, 32, CreateFlags::READABLE).with_mip_levels(1),
        None,
    );
    assert!(matches!(result, Err(TextureError::StagingAllocationFailed { .. })));
    assert_eq!(ctx.dummy().images_created(), 1);
    assert_eq!(ctx.dummy().live_images(), 0);
    assert_eq!(ctx.dummy().live_staging(), 0);
    assert!(ctx.textures.is_empty());
}

#[test]
fn test_clear_on_create_commands() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let count = |ctx: &TestContext, f: fn(&RecordedCommand) -> bool| {
        ctx.dummy().commands().iter().filter(|c| f(c)).count()
    };

    ctx.textures
        .create(
            &TextureCreateInfo::new_2d(16, 16, CreateFlags::RENDER_TARGET).with_mip_levels(1),
            None,
        )
        .unwrap();
    assert_eq!(count(&ctx, |c| matches!(c, RecordedCommand::ClearColor { .. })), 1);

    let depth = CreateFlags::RENDER_TARGET.with_format(TextureFormat::Depth24S8);
    ctx.textures
        .create(&TextureCreateInfo::new_2d(16, 16, depth).with_mip_levels(1), None)
        .unwrap();
    assert_eq!(
        count(&ctx, |c| matches!(c, RecordedCommand::ClearDepthStencil { .. })),
        1
    );

    ctx.dummy().clear_commands();
    let storage = CreateFlags::UNORDERED_ACCESS | CreateFlags::CLEAR_ON_CREATE;
    ctx.textures
        .create(&TextureCreateInfo::new_2d(16, 16, storage).with_mip_levels(3), None)
        .unwrap();
    assert_eq!(count(&ctx, |c| matches!(c, RecordedCommand::ClearStorage { .. })), 3);

    ctx.dummy().clear_commands();
    ctx.textures
        .create(&TextureCreateInfo::new_2d(16, 16, CreateFlags::empty()).with_mip_levels(3), None)
        .unwrap();
    assert!(ctx.dummy().commands().iter().all(|c| !matches!(
        c,
        RecordedCommand::Upload { .. } | RecordedCommand::ClearColor { .. }
    )));

    ctx.textures
        .create(
            &TextureCreateInfo::new_2d(16, 16, CreateFlags::CLEAR_ON_CREATE).with_mip_levels(3),
            None,
        )
        .unwrap();
    assert!(count(&ctx, |c| matches!(c, RecordedCommand::Upload { .. })) >= 1);
}

// ============================================================================
// Aliasing Tests
// ============================================================================

#[test]
fn test_alias_shares_base_memory() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let base = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(64, 64, CreateFlags::RENDER_TARGET).with_mip_levels(1),
            None,
        )
        .unwrap();
    let total = ctx.textures.total_resident_size();
    assert!(total > 0);

    let view = CreateFlags::RENDER_TARGET.with_format(TextureFormat::R32F);
    let alias = ctx
        .textures
        .alias(
            base,
            &TextureCreateInfo::new_2d(64, 64, view)
                .with_mip_levels(1)
                .with_label("alias"),
        )
        .unwrap();

    let record = ctx.textures.get(alias).unwrap();
    assert!(record.is_aliased());
    assert!(!ctx.textures.get(base).unwrap().is_aliased());
    assert_eq!(record.format(), TextureFormat::R32F);
    assert_eq!(ctx.textures.resident_size(alias).unwrap(), 0);
    assert_eq!(ctx.textures.total_resident_size(), total);
    assert!(ctx.dummy().commands().iter().any(|c| matches!(
        c,
        RecordedCommand::CreateImage { aliased: true, name, .. } if name == "alias"
    )));

    ctx.textures.destroy(alias).unwrap();
    assert_eq!(ctx.textures.total_resident_size(), total);
}

#[test]
fn test_alias_adopts_base_fast_pool_placement() {
    let mut ctx = TestContext::with_capabilities(DeviceCapabilities {
        fast_memory_pool: true,
        linear_layout: false,
    });
    let base = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::RENDER_TARGET | CreateFlags::FAST_POOL_ONLY)
                .with_mip_levels(1),
            None,
        )
        .unwrap();

    let plain = ctx
        .textures
        .alias(
            base,
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::RENDER_TARGET).with_mip_levels(1),
        )
        .unwrap();
    let flags = ctx.textures.get(plain).unwrap().flags();
    assert!(flags.contains(CreateFlags::FAST_POOL_ONLY));
    assert!(!flags.contains(CreateFlags::FAST_POOL_MOVABLE));

    let movable = ctx
        .textures
        .alias(
            base,
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::RENDER_TARGET | CreateFlags::FAST_POOL_MOVABLE)
                .with_mip_levels(1),
        )
        .unwrap();
    let flags = ctx.textures.get(movable).unwrap().flags();
    assert_eq!(flags & CreateFlags::FAST_POOL, CreateFlags::FAST_POOL_ONLY);
}

#[test]
fn test_alias_keeps_flags_without_fast_pool() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let base = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::RENDER_TARGET | CreateFlags::FAST_POOL_ONLY)
                .with_mip_levels(1),
            None,
        )
        .unwrap();
    let alias = ctx
        .textures
        .alias(
            base,
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::RENDER_TARGET).with_mip_levels(1),
        )
        .unwrap();
    assert!(!ctx
        .textures
        .get(alias)
        .unwrap()
        .flags()
        .intersects(CreateFlags::FAST_POOL));
}

#[test]
fn test_alias_of_stub_is_rejected() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let header = DdsxHeader::new(TextureFormat::A8R8G8B8, 64, 64, 1);
    let stub = ctx
        .textures
        .allocate_ddsx(&header, &DdsxLoadOptions::default(), "streamed")
        .unwrap();
    let count = ctx.textures.len();

    let result = ctx.textures.alias(
        stub,
        &TextureCreateInfo::new_2d(64, 64, CreateFlags::empty()).with_mip_levels(1),
    );
    assert!(matches!(result, Err(TextureError::Precondition(_))));
    assert_eq!(ctx.textures.len(), count);
    assert!(ctx
        .dummy()
        .commands()
        .iter()
        .all(|c| !matches!(c, RecordedCommand::CreateImage { aliased: true, .. })));
}

// ============================================================================
// Lock Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_write_then_read_roundtrip(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(64, 64, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    let pattern = generate_test_pattern(64 * 64 * 4, 7);
    ctx.write_level(handle, 0, 64 * 4, &pattern);
    assert_eq!(ctx.read_level(handle, 0, 64 * 4, 64), pattern);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_cube_face_lock(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_cube(16, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    assert!(matches!(
        ctx.textures.lock(handle, 0, LockFlags::READ),
        Err(TextureError::Unsupported(_))
    ));

    {
        let region = ctx.textures.lock_face(handle, 3, 0, LockFlags::WRITE).unwrap();
        region.data.fill(0xab);
    }
    ctx.textures.unlock(handle).unwrap();

    let face = {
        let region = ctx.textures.lock_face(handle, 3, 0, LockFlags::READ).unwrap();
        copy_rows_out(region.data, region.row_pitch as usize, 16 * 4, 16)
    };
    ctx.textures.unlock(handle).unwrap();
    assert!(face.iter().all(|&b| b == 0xab));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_discard_lock_replaces_content(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(32, 32, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    if let Some(dummy) = &ctx.dummy {
        dummy.clear_commands();
    }
    {
        let region = ctx.textures.lock(handle, 0, LockFlags::DISCARD).unwrap();
        region.data.fill(0x5a);
    }
    ctx.textures.unlock(handle).unwrap();

    if let Some(dummy) = &ctx.dummy {
        assert!(dummy.commands().iter().any(|c| matches!(
            c,
            RecordedCommand::Upload {
                queue: DeviceQueue::Upload,
                discard: true,
                ..
            }
        )));
    }
    let read = ctx.read_level(handle, 0, 32 * 4, 32);
    assert!(read.iter().all(|&b| b == 0x5a));
}

#[test]
fn test_no_block_lock_reports_not_ready() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let pattern = generate_test_pattern(8 * 8 * 4, 3);
    let data = [SubresourceData::new(&pattern, 8 * 4)];
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(8, 8, CreateFlags::empty()).with_mip_levels(1),
            Some(&data),
        )
        .unwrap();

    ctx.dummy().set_auto_complete(false);
    ctx.textures.begin_readback(handle).unwrap();
    assert_eq!(
        ctx.textures.get(handle).unwrap().lock_state(),
        &LockState::Prefetched
    );
    assert!(matches!(
        ctx.textures.lock(handle, 0, LockFlags::READ | LockFlags::NO_BLOCK),
        Err(TextureError::NotReady)
    ));
    assert_eq!(
        ctx.textures.get(handle).unwrap().lock_state(),
        &LockState::Prefetched
    );

    ctx.dummy().complete_all();
    let read = {
        let region = ctx
            .textures
            .lock(handle, 0, LockFlags::READ | LockFlags::NO_BLOCK)
            .unwrap();
        copy_rows_out(region.data, region.row_pitch as usize, 8 * 4, 8)
    };
    ctx.textures.unlock(handle).unwrap();
    assert_eq!(read, pattern);
}

#[test]
fn test_double_lock_and_stray_unlock() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(8, 8, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    assert!(matches!(ctx.textures.unlock(handle), Err(TextureError::NotLocked(_))));
    ctx.textures.lock(handle, 0, LockFlags::WRITE).unwrap();
    assert!(matches!(
        ctx.textures.lock(handle, 0, LockFlags::READ),
        Err(TextureError::AlreadyLocked(_))
    ));
    assert!(matches!(
        ctx.textures.downsize(handle, &ResizeRequest::new(4, 4, 1)),
        Err(TextureError::Busy(_))
    ));
    ctx.textures.unlock(handle).unwrap();
}

#[test]
fn test_volume_box_lock_pitches() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_volume(8, 8, 4, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    {
        let region = ctx.textures.lock_box(handle, 0, LockFlags::WRITE).unwrap();
        assert_eq!(region.slice_pitch, region.row_pitch * 8);
        assert_eq!(region.data.len(), region.slice_pitch as usize * 4);
    }
    ctx.textures.unlock(handle).unwrap();
}

#[test]
fn test_write_unlock_updates_system_copy() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let initial = generate_test_pattern(8 * 8 * 4, 3);
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(8, 8, CreateFlags::SYSTEM_COPY).with_mip_levels(1),
            Some(&[SubresourceData::new(&initial, 8 * 4)]),
        )
        .unwrap();
    let mirror = ctx.textures.get(handle).unwrap().mirror().unwrap();
    assert_eq!(mirror.subresource(0, 0), Some(initial.as_slice()));

    {
        let region = ctx.textures.lock(handle, 0, LockFlags::WRITE).unwrap();
        let row_pitch = region.row_pitch as usize;
        assert!(row_pitch >= 8 * 4);
        for row in 0..8 {
            region.data[row * row_pitch..row * row_pitch + 8 * 4].fill(0xab);
        }
    }
    ctx.textures.unlock(handle).unwrap();

    let mirror = ctx.textures.get(handle).unwrap().mirror().unwrap();
    assert_eq!(mirror.subresource(0, 0), Some(&[0xab_u8; 8 * 8 * 4][..]));
}

#[test]
fn test_write_unlock_uploads_on_upload_queue() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(16, 16, CreateFlags::SYSTEM_MEMORY).with_mip_levels(1),
            None,
        )
        .unwrap();
    let uploads = |ctx: &TestContext| -> Vec<(DeviceQueue, bool)> {
        ctx.dummy()
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Upload { queue, discard, .. } => Some((*queue, *discard)),
                _ => None,
            })
            .collect()
    };

    ctx.dummy().clear_commands();
    ctx.textures.lock(handle, 0, LockFlags::WRITE).unwrap();
    ctx.textures.unlock(handle).unwrap();
    assert_eq!(uploads(&ctx), vec![(DeviceQueue::Upload, false)]);

    ctx.dummy().clear_commands();
    ctx.textures
        .lock(handle, 0, LockFlags::WRITE | LockFlags::COPY_TO_STAGING)
        .unwrap();
    ctx.textures.unlock(handle).unwrap();
    assert_eq!(uploads(&ctx), vec![(DeviceQueue::Upload, false)]);
}

// ============================================================================
// Resize Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_resize_to_same_size_keeps_content(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let chain = mip_chain(64, 64, 4);
    let data = chain_data(64, &chain);
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(64, 64, CreateFlags::empty()).with_mip_levels(4),
            Some(&data),
        )
        .unwrap();

    ctx.textures.downsize(handle, &ResizeRequest::new(64, 64, 4)).unwrap();
    for (mip, expected) in chain.iter().enumerate() {
        let size = (64 >> mip) as usize;
        assert_eq!(&ctx.read_level(handle, mip as u32, size * 4, size), expected, "mip {mip}");
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_downsize_drops_top_mip(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let chain = mip_chain(64, 64, 4);
    let data = chain_data(64, &chain);
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(64, 64, CreateFlags::empty()).with_mip_levels(4),
            Some(&data),
        )
        .unwrap();
    let tracker_slot = 2;
    ctx.textures
        .set_srv_binding(handle, ShaderStage::Pixel, tracker_slot, true)
        .unwrap();

    ctx.textures
        .downsize(handle, &ResizeRequest::new(32, 32, 3).with_level_offset(1))
        .unwrap();
    let info = ctx.textures.info(handle, 0).unwrap();
    assert_eq!((info.width, info.mip_levels), (32, 3));
    assert_eq!(ctx.textures.get(handle).unwrap().mip_range(), 0..3);
    assert_eq!(ctx.read_level(handle, 0, 32 * 4, 32), chain[1]);
    assert_eq!(ctx.read_level(handle, 2, 8 * 4, 8), chain[3]);

    let dirty = ctx.tracker.take_dirty(ShaderStage::Pixel);
    assert_eq!(dirty.srv, 1 << tracker_slot);
    assert_eq!(dirty.sampler, 1 << tracker_slot);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_upsize_keeps_existing_mips(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let chain = mip_chain(32, 32, 3);
    let data = chain_data(32, &chain);
    let handle = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::empty()).with_mip_levels(3),
            Some(&data),
        )
        .unwrap();

    ctx.textures
        .upsize(handle, &ResizeRequest::new(64, 64, 4).with_level_offset(1))
        .unwrap();
    let record = ctx.textures.get(handle).unwrap();
    assert_eq!(record.mip_levels(), 4);
    assert_eq!(record.mip_range(), 1..4);
    assert_eq!(ctx.read_level(handle, 1, 32 * 4, 32), chain[0]);
}

// ============================================================================
// Copy Tests
// ============================================================================

#[test]
fn test_sub_region_copy_rounds_to_blocks() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let flags = CreateFlags::empty().with_format(TextureFormat::Dxt1);
    // 4x4 blocks of 8 bytes each.
    let blocks = generate_test_pattern(4 * 4 * 8, 0);
    let data = [SubresourceData::new(&blocks, 4 * 8)];
    let src = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(16, 16, flags).with_mip_levels(1), Some(&data))
        .unwrap();
    let dst = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(16, 16, flags).with_mip_levels(1), None)
        .unwrap();

    ctx.dummy().clear_commands();
    let copy = SubRegionCopy::new(Extent3d::new_2d(6, 3))
        .with_source(0, 0, Offset3d::new(1, 2, 0))
        .with_destination(0, 0, Offset3d::new(5, 0, 0));
    ctx.textures.update_sub_region(dst, src, &copy).unwrap();

    let commands = ctx.dummy().commands();
    let Some(RecordedCommand::CopyImage {
        region: Some(region), ..
    }) = commands.last()
    else {
        panic!("expected a region copy, got {commands:?}");
    };
    assert_eq!(region.src_offset, Offset3d::new(4, 4, 0));
    assert_eq!(region.extent, Extent3d::new(8, 4, 1));
    assert_eq!(region.dst_offset, Offset3d::new(8, 0, 0));
}

#[test]
fn test_update_requires_matching_geometry() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let src = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(16, 16, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    let dst = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::UPDATE_DESTINATION).with_mip_levels(1),
            None,
        )
        .unwrap();
    assert!(matches!(
        ctx.textures.update(dst, src),
        Err(TextureError::GeometryMismatch(_))
    ));

    let not_destination = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(16, 16, CreateFlags::empty()).with_mip_levels(1), None)
        .unwrap();
    assert!(matches!(
        ctx.textures.update(not_destination, src),
        Err(TextureError::Precondition(_))
    ));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_replace_moves_donor_backing(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let small = generate_test_pattern(16 * 16 * 4, 1);
    let large = generate_test_pattern(32 * 32 * 4, 99);
    let target = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(16, 16, CreateFlags::empty()).with_mip_levels(1),
            Some(&[SubresourceData::new(&small, 16 * 4)]),
        )
        .unwrap();
    let donor = ctx
        .textures
        .create(
            &TextureCreateInfo::new_2d(32, 32, CreateFlags::empty()).with_mip_levels(1),
            Some(&[SubresourceData::new(&large, 32 * 4)]),
        )
        .unwrap();

    ctx.textures.replace(target, donor).unwrap();
    assert!(!ctx.textures.contains(donor));
    assert_eq!(ctx.textures.info(target, 0).unwrap().width, 32);
    assert_eq!(ctx.read_level(target, 0, 32 * 4, 32), large);
}

// ============================================================================
// Binding Tests
// ============================================================================

#[test]
fn test_sampler_change_marks_bound_slots() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(8, 8, CreateFlags::empty()), None)
        .unwrap();
    ctx.textures
        .set_srv_binding(handle, ShaderStage::Pixel, 3, true)
        .unwrap();

    ctx.textures.set_filter(handle, FilterMode::Point).unwrap();
    assert_eq!(ctx.tracker.take_dirty(ShaderStage::Pixel).sampler, 1 << 3);

    ctx.textures.set_filter(handle, FilterMode::Point).unwrap();
    assert_eq!(ctx.tracker.take_dirty(ShaderStage::Pixel).sampler, 0);
    assert_eq!(ctx.tracker.take_dirty(ShaderStage::Vertex).sampler, 0);
}

#[test]
fn test_destroy_while_bound_is_reported() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let handle = ctx
        .textures
        .create(&TextureCreateInfo::new_2d(8, 8, CreateFlags::empty()), None)
        .unwrap();
    ctx.textures
        .set_uav_binding(handle, ShaderStage::Compute, 1, true)
        .unwrap();
    ctx.textures.destroy(handle).unwrap();
    assert_eq!(ctx.tracker.deleted_while_bound(), 1);
    assert_eq!(ctx.tracker.take_dirty(ShaderStage::Compute).uav, 1 << 1);
    assert_eq!(ctx.dummy().live_images(), 0);
}

// ============================================================================
// DDSx Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_ddsx_load(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let header = DdsxHeader::new(TextureFormat::A8R8G8B8, 8, 8, 2);
    let top = generate_test_pattern(8 * 8 * 4, 11);
    let second = generate_test_pattern(4 * 4 * 4, 200);
    let mut stream = header.as_bytes().to_vec();
    stream.extend_from_slice(&top);
    stream.extend_from_slice(&second);

    let options = DdsxLoadOptions::new(CreateFlags::SYSTEM_COPY);
    let handle = ctx
        .textures
        .load_ddsx(&mut Cursor::new(stream), &options, "loaded")
        .unwrap();

    let record = ctx.textures.get(handle).unwrap();
    assert!(!record.is_stub());
    assert_eq!(record.mip_levels(), 2);
    assert!(record.flags().contains(CreateFlags::SRGB_READ));
    let mirror = record.mirror().expect("system copy requested");
    assert_eq!(mirror.subresource(0, 0), Some(top.as_slice()));
    assert_eq!(mirror.subresource(1, 0), Some(second.as_slice()));

    assert_eq!(ctx.read_level(handle, 0, 8 * 4, 8), top);
    assert_eq!(ctx.read_level(handle, 1, 4 * 4, 4), second);
}

#[test]
fn test_ddsx_bad_label_creates_nothing() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut stream = DdsxHeader::new(TextureFormat::A8R8G8B8, 4, 4, 1).as_bytes().to_vec();
    stream[..4].copy_from_slice(b"DDS ");
    stream.extend_from_slice(&[0u8; 64]);

    let result = ctx
        .textures
        .load_ddsx(&mut Cursor::new(stream), &DdsxLoadOptions::default(), "bad");
    assert_eq!(result, Err(TextureError::BadLabel(*b"DDS ")));
    assert!(ctx.textures.is_empty());
    assert_eq!(ctx.dummy().images_created(), 0);
}

#[test]
fn test_ddsx_truncated_payload_destroys_texture() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut stream = DdsxHeader::new(TextureFormat::A8R8G8B8, 8, 8, 1).as_bytes().to_vec();
    stream.extend_from_slice(&[0u8; 16]);

    let result = ctx
        .textures
        .load_ddsx(&mut Cursor::new(stream), &DdsxLoadOptions::default(), "short");
    assert!(result.is_err());
    assert!(ctx.textures.is_empty());
    assert_eq!(ctx.dummy().live_images(), 0);
}

#[test]
fn test_ddsx_stub_reports_final_geometry() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let header = DdsxHeader::new(TextureFormat::Dxt5, 512, 256, 8);
    let handle = ctx
        .textures
        .allocate_ddsx(&header, &DdsxLoadOptions::default(), "streamed")
        .unwrap();
    let info = ctx.textures.info(handle, 0).unwrap();
    assert_eq!((info.width, info.height, info.mip_levels), (512, 256, 8));
    assert!(ctx.textures.get(handle).unwrap().is_stub());
    assert_eq!(ctx.textures.resident_size(handle).unwrap(), 0);
    assert!(matches!(
        ctx.textures.lock(handle, 0, LockFlags::READ),
        Err(TextureError::Precondition(_))
    ));
}
