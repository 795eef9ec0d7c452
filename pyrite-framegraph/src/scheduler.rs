//! The frame-graph scheduler: a dispatcher thread that takes
//! this frame's culled, dependency-annotated passes, distributes them
//! round-robin across a fixed pool of `Worker`s, uploads the per-view and
//! vector-data buffers ahead of any worker recording, then waits for every
//! worker to report back before submitting their command lists in a fixed
//! order and presenting. Grounded method-for-method on
//! `Dusk/Graphics/FrameGraph.cpp`'s `FrameGraphScheduler::jobDispatcherThread`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use pyrite_core::device::{BufferDesc, BufferHandle, BufferUsage, Device};
use pyrite_core::filesystem::Filesystem;
use pyrite_shader_cache::ShaderBackendDir;

use crate::resources::INSTANCE_BUFFER_SIZE;
use crate::worker::{ScheduledPass, Worker};

pub const STATE_READY: u8 = 0;
pub const STATE_HAS_JOB_TO_DO: u8 = 1;
pub const STATE_WAITING_JOB_COMPLETION: u8 = 2;
pub const STATE_WAITING_SHUTDOWN: u8 = 3;

struct DispatcherShared<D: Device, F: Filesystem> {
    state: AtomicU8,
    enqueued: Mutex<Vec<ScheduledPass<D, F>>>,
    per_view_data: Mutex<Vec<u8>>,
    vector_buffer_data: Mutex<Vec<u8>>,
    material_ed_data: Mutex<Vec<u8>>,
}

/// component I. Owns the three buffers every worker's draw calls read from
/// (`PerViewBuffer`, `MaterialEdBuffer`, `VectorDataBuffer`), created up
/// front the way the original's `FrameGraphScheduler` constructor does, so a
/// caller can `import_persistent_buffer` them into a `FrameGraphResources`
/// registry under the matching well-known hash (see `crate::builder`).
pub struct Scheduler<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    shared: Arc<DispatcherShared<D, F>>,
    dispatcher_handle: Option<JoinHandle<()>>,
    per_view_buffer: BufferHandle,
    material_ed_buffer: BufferHandle,
    vector_data_buffer: BufferHandle,
}

impl<D, F> Scheduler<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: D,
        filesystem: F,
        worker_count: usize,
        per_view_buffer_size: u64,
        material_ed_buffer_size: u64,
        backend_dir: ShaderBackendDir,
        disable_pipeline_cache: bool,
        fallback_vertex_hash: &str,
        fallback_pixel_hash: &str,
        fallback_compute_hash: &str,
    ) -> Result<Self, pyrite_core::error::DeviceError> {
        assert!(worker_count > 0, "scheduler needs at least one render-thread worker");

        let per_view_buffer = device.create_buffer(&BufferDesc { size: per_view_buffer_size, usage: BufferUsage::UNIFORM })?;
        let material_ed_buffer =
            device.create_buffer(&BufferDesc { size: material_ed_buffer_size, usage: BufferUsage::UNIFORM })?;
        let vector_data_buffer = device.create_buffer(&BufferDesc {
            size: INSTANCE_BUFFER_SIZE as u64,
            usage: BufferUsage::STORAGE,
        })?;

        let shared = Arc::new(DispatcherShared {
            state: AtomicU8::new(STATE_READY),
            enqueued: Mutex::new(Vec::new()),
            per_view_data: Mutex::new(Vec::new()),
            vector_buffer_data: Mutex::new(vec![0u8; INSTANCE_BUFFER_SIZE]),
            material_ed_data: Mutex::new(vec![0u8; material_ed_buffer_size as usize]),
        });

        let workers: Vec<Worker<D, F>> = (0..worker_count)
            .map(|_| {
                Worker::spawn(
                    device.clone(),
                    filesystem.clone(),
                    backend_dir,
                    disable_pipeline_cache,
                    fallback_vertex_hash,
                    fallback_pixel_hash,
                    fallback_compute_hash,
                )
            })
            .collect();

        let dispatcher_shared = shared.clone();
        let dispatcher_handle = thread::spawn(move || {
            dispatcher_loop(
                dispatcher_shared,
                device,
                workers,
                worker_count,
                per_view_buffer,
                material_ed_buffer,
                vector_data_buffer,
            )
        });

        Ok(Scheduler {
            shared,
            dispatcher_handle: Some(dispatcher_handle),
            per_view_buffer,
            material_ed_buffer,
            vector_data_buffer,
        })
    }

    pub fn per_view_buffer(&self) -> BufferHandle {
        self.per_view_buffer
    }

    pub fn material_ed_buffer(&self) -> BufferHandle {
        self.material_ed_buffer
    }

    pub fn vector_data_buffer(&self) -> BufferHandle {
        self.vector_data_buffer
    }

    /// Stages the material-editor buffer's contents for the next dispatch.
    /// Unlike `dispatch`, this can be called any time between frames (the
    /// material editor pushes an update whenever the user edits a live
    /// parameter, not necessarily once per frame) — it only stages the
    /// bytes; `dispatcher_loop` uploads them alongside the per-view and
    /// vector-data buffers the next time it runs.
    pub fn update_material_ed_buffer(&self, data: &[u8]) {
        let mut staged = self.shared.material_ed_data.lock().unwrap();
        staged.clear();
        staged.extend_from_slice(data);
    }

    pub fn add_render_pass(&self, pass: ScheduledPass<D, F>) {
        self.shared.enqueued.lock().unwrap().push(pass);
    }

    /// Async-compute passes are not distinguished from synchronous ones yet
    /// (aliased in the original behind
    /// `#ifndef DUSK_ASYNC_COMPUTE_AVAILABLE`, which was never defined in
    /// the shipped build): enqueues onto the same worker pool.
    pub fn add_async_compute_render_pass(&self, pass: ScheduledPass<D, F>) {
        self.add_render_pass(pass);
    }

    pub fn is_ready(&self) -> bool {
        self.shared
            .state
            .compare_exchange_weak(STATE_READY, STATE_READY, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Stages this frame's per-view/vector data and flips the dispatcher
    /// `Ready -> HasJobToDo`. A no-op, staying `Ready`, if nothing was
    /// enqueued this frame (scheduler
    /// idempotence on an empty frame).
    pub fn dispatch(&self, per_view_data: &[u8], vector_buffer_data: &[u8]) {
        if self.shared.enqueued.lock().unwrap().is_empty() {
            return;
        }

        *self.shared.per_view_data.lock().unwrap() = per_view_data.to_vec();
        {
            let mut staged = self.shared.vector_buffer_data.lock().unwrap();
            staged.clear();
            staged.extend_from_slice(vector_buffer_data);
        }

        let result = self.shared.state.compare_exchange(
            STATE_READY,
            STATE_HAS_JOB_TO_DO,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        assert!(result.is_ok(), "failed to dispatch the frame graph: the scheduler is busy with the previous frame");
    }

    pub fn wait_pending_frame_completion(&self) {
        while !self.is_ready() {
            thread::yield_now();
        }
    }
}

impl<D, F> Drop for Scheduler<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    fn drop(&mut self) {
        self.shared.state.store(STATE_WAITING_SHUTDOWN, Ordering::Release);
        if let Some(handle) = self.dispatcher_handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatcher_loop<D, F>(
    shared: Arc<DispatcherShared<D, F>>,
    device: D,
    mut workers: Vec<Worker<D, F>>,
    worker_count: usize,
    per_view_buffer: BufferHandle,
    material_ed_buffer: BufferHandle,
    vector_data_buffer: BufferHandle,
) where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    loop {
        match shared.state.compare_exchange_weak(
            STATE_HAS_JOB_TO_DO,
            STATE_HAS_JOB_TO_DO,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => {}
            Err(STATE_WAITING_SHUTDOWN) => return,
            Err(_) => {
                thread::yield_now();
                continue;
            }
        }

        shared.state.store(STATE_WAITING_JOB_COMPLETION, Ordering::Release);

        let passes = std::mem::take(&mut *shared.enqueued.lock().unwrap());
        let pass_count = passes.len();
        let passes_per_worker = pass_count / worker_count + 1;

        let mut worker_idx = 0;
        let mut assigned = 0;
        for pass in passes {
            workers[worker_idx].enqueue_render_pass(pass);
            assigned += 1;
            if assigned >= passes_per_worker {
                worker_idx = (worker_idx + 1) % worker_count;
                assigned = 0;
            }
        }

        // Upload this frame's per-view, material-editor, and vector-data
        // buffers before any worker starts recording. These are
        // immediate device writes rather than copy-command-list recordings
        // since `Device::update_buffer` is an out-of-band op in this
        // workspace's backend contract, not a `CommandList` op.
        {
            let per_view_bytes = shared.per_view_data.lock().unwrap();
            device.update_buffer(per_view_buffer, 0, &per_view_bytes);
        }
        {
            let material_ed_bytes = shared.material_ed_data.lock().unwrap();
            device.update_buffer(material_ed_buffer, 0, &material_ed_bytes);
        }
        {
            let vector_bytes = shared.vector_buffer_data.lock().unwrap();
            device.update_buffer(vector_data_buffer, 0, &vector_bytes);
        }

        for worker in workers.iter() {
            if worker.has_work_todo() {
                let mut cmd_list = device.allocate_graphics_command_list();
                cmd_list.begin();
                worker.flush(cmd_list);
            }
        }

        while !workers.iter().all(|w| w.is_ready()) {
            thread::yield_now();
        }

        let mut to_submit = Vec::with_capacity(worker_count);
        for worker in workers.iter() {
            if let Some(mut cmd_list) = worker.take_command_list() {
                cmd_list.end();
                to_submit.push(cmd_list);
            }
        }
        device.submit_command_lists(to_submit);
        device.present();

        shared.state.store(STATE_READY, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::device::{
        CommandList as CommandListTrait, ImageDesc, ImageHandle, ImageViewDesc, ImageViewFlags, PipelineDescriptor,
        PipelineStateBlob, PipelineStateHandle, SamplerDesc, SamplerHandle, ShaderHandle, ShaderStage,
    };
    use pyrite_core::error::{CoreError, DeviceError};
    use pyrite_core::filesystem::{FileOpenMode, FsObject};
    use std::collections::HashMap;
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct MockCommandList(Arc<Mutex<Vec<String>>>);
    impl CommandListTrait for MockCommandList {
        fn begin(&mut self) {
            self.0.lock().unwrap().push("begin".into());
        }
        fn end(&mut self) {
            self.0.lock().unwrap().push("end".into());
        }
        fn bind_pipeline_state(&mut self, _pipeline: PipelineStateHandle) {}
        fn bind_image(&mut self, _slot: u32, _image: ImageHandle) {}
        fn bind_buffer(&mut self, _slot: u32, _buffer: BufferHandle) {}
        fn bind_sampler(&mut self, _slot: u32, _sampler: SamplerHandle) {}
        fn bind_constant_buffer(&mut self, _slot: u32, _buffer: BufferHandle) {}
        fn set_viewport(&mut self, _x: f32, _y: f32, _w: f32, _h: f32) {}
        fn set_scissor(&mut self, _x: i32, _y: i32, _w: u32, _h: u32) {}
        fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32) {}
        fn draw_indexed(&mut self, _index_count: u32, _instance_count: u32, _first_index: u32) {}
        fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {}
        fn push_event_marker(&mut self, _name: &str) {}
        fn pop_event_marker(&mut self) {}
        fn setup_framebuffer(&mut self, _color_rts: &[ImageHandle], _depth_stencil: Option<ImageHandle>) {}
        fn clear_render_targets(&mut self, _color_rts: &[ImageHandle], _value: [f32; 4]) {}
        fn clear_depth_stencil(&mut self, _depth_stencil: ImageHandle, _depth: f32, _stencil: u8) {}
        fn prepare_and_bind_resource_list(&mut self, _images: &[ImageHandle], _buffers: &[BufferHandle]) {}
        fn multi_draw_indexed_instanced_indirect(&mut self, _args_buffer: BufferHandle, _draw_count: u32) {}
    }

    #[derive(Clone)]
    struct MockDevice {
        next: Arc<AtomicU64>,
        updates: Arc<Mutex<Vec<(BufferHandle, Vec<u8>)>>>,
        present_count: Arc<AtomicU64>,
        submitted_lists: Arc<Mutex<Vec<usize>>>,
    }

    impl MockDevice {
        fn new() -> Self {
            MockDevice {
                next: Arc::new(AtomicU64::new(1)),
                updates: Arc::new(Mutex::new(Vec::new())),
                present_count: Arc::new(AtomicU64::new(0)),
                submitted_lists: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Device for MockDevice {
        type CommandList = MockCommandList;

        fn create_buffer(&self, _desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
            Ok(BufferHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_buffer(&self, _buffer: BufferHandle) {}
        fn update_buffer(&self, buffer: BufferHandle, _offset: u64, data: &[u8]) {
            self.updates.lock().unwrap().push((buffer, data.to_vec()));
        }

        fn create_image(&self, _desc: &ImageDesc) -> Result<ImageHandle, DeviceError> {
            Ok(ImageHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_image(&self, _image: ImageHandle) {}
        fn create_image_view(&self, _image: ImageHandle, _view_desc: &ImageViewDesc, _flags: ImageViewFlags) -> Result<(), DeviceError> {
            Ok(())
        }
        fn copy_image(&self, _src: ImageHandle, _dst: ImageHandle) {}
        fn resolve_image(&self, _src: ImageHandle, _dst: ImageHandle) {}

        fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
            Ok(SamplerHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_sampler(&self, _sampler: SamplerHandle) {}

        fn create_shader(&self, _stage: ShaderStage, _bytecode: &[u8]) -> Result<ShaderHandle, DeviceError> {
            Ok(ShaderHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_shader(&self, _shader: ShaderHandle) {}

        fn create_pipeline_state(
            &self,
            _descriptor: &PipelineDescriptor,
            _shaders: &[ShaderHandle],
            _cached_blob: Option<&[u8]>,
        ) -> Result<PipelineStateHandle, DeviceError> {
            Ok(PipelineStateHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn get_pipeline_state_cache(&self, _pipeline: PipelineStateHandle) -> Option<PipelineStateBlob> {
            None
        }
        fn destroy_pipeline_state_cache(&self, _pipeline: PipelineStateHandle) {}
        fn destroy_pipeline_state(&self, _pipeline: PipelineStateHandle) {}

        fn allocate_graphics_command_list(&self) -> Self::CommandList {
            MockCommandList::default()
        }
        fn allocate_compute_command_list(&self) -> Self::CommandList {
            MockCommandList::default()
        }
        fn allocate_copy_command_list(&self) -> Self::CommandList {
            MockCommandList::default()
        }
        fn submit_command_list(&self, _list: Self::CommandList) {}
        fn submit_command_lists(&self, lists: Vec<Self::CommandList>) {
            self.submitted_lists.lock().unwrap().push(lists.len());
        }

        fn get_swapchain_buffer(&self) -> ImageHandle {
            ImageHandle(0)
        }
        fn present(&self) {
            self.present_count.fetch_add(1, Ordering::SeqCst);
        }
        fn resize_backbuffer(&self, _width: u32, _height: u32) {}
    }

    #[derive(Clone)]
    struct MockFsObject(Cursor<Vec<u8>>);
    impl Read for MockFsObject {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl Write for MockFsObject {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }
    impl Seek for MockFsObject {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }
    impl FsObject for MockFsObject {
        fn size(&self) -> u64 {
            self.0.get_ref().len() as u64
        }
        fn close(&mut self) {}
    }

    #[derive(Clone, Default)]
    struct MockFilesystem {
        files: Arc<StdMutex<HashMap<String, Vec<u8>>>>,
    }

    impl Filesystem for MockFilesystem {
        type Object = MockFsObject;

        fn open(&self, path: &str, mode: FileOpenMode) -> Result<Self::Object, CoreError> {
            if mode.contains(FileOpenMode::READ) {
                let files = self.files.lock().unwrap();
                let bytes = files
                    .get(path)
                    .cloned()
                    .ok_or_else(|| CoreError::FileOpen { path: path.to_string(), reason: "not found".into() })?;
                Ok(MockFsObject(Cursor::new(bytes)))
            } else {
                Ok(MockFsObject(Cursor::new(Vec::new())))
            }
        }
    }

    fn new_scheduler(device: MockDevice) -> Scheduler<MockDevice, MockFilesystem> {
        Scheduler::new(
            device,
            MockFilesystem::default(),
            2,
            256,
            128,
            ShaderBackendDir::Spirv,
            true,
            "fallback_vertex",
            "fallback_pixel",
            "fallback_compute",
        )
        .unwrap()
    }

    fn wait_ready<D, F>(scheduler: &Scheduler<D, F>)
    where
        D: Device + Clone + Send + Sync + 'static,
        F: Filesystem + Clone + Send + Sync + 'static,
        D::CommandList: Send,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !scheduler.is_ready() && Instant::now() < deadline {
            thread::yield_now();
        }
    }

    #[test]
    fn dispatch_with_nothing_enqueued_is_a_no_op() {
        let device = MockDevice::new();
        let scheduler = new_scheduler(device.clone());

        scheduler.dispatch(&[], &[]);
        wait_ready(&scheduler);

        assert!(scheduler.is_ready());
        assert_eq!(device.present_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatching_an_enqueued_pass_runs_it_and_presents() {
        let device = MockDevice::new();
        let scheduler = new_scheduler(device.clone());

        let executed = Arc::new(AtomicU64::new(0));
        let executed_clone = executed.clone();
        let pass = ScheduledPass::new(
            "main",
            Vec::new(),
            Arc::new(move |_cmd, _pso| {
                executed_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        scheduler.add_render_pass(pass);
        scheduler.dispatch(&[1, 2, 3], &[]);
        wait_ready(&scheduler);

        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(device.present_count.load(Ordering::SeqCst), 1);
        assert!(device.updates.lock().unwrap().iter().any(|(handle, data)| *handle == scheduler.per_view_buffer() && data == &vec![1u8, 2, 3]));
    }

    #[test]
    fn update_material_ed_buffer_is_uploaded_on_the_next_dispatch() {
        let device = MockDevice::new();
        let scheduler = new_scheduler(device.clone());

        scheduler.update_material_ed_buffer(&[9u8, 8, 7]);

        let pass = ScheduledPass::new("main", Vec::new(), Arc::new(move |_cmd, _pso| {}));
        scheduler.add_render_pass(pass);
        scheduler.dispatch(&[], &[]);
        wait_ready(&scheduler);

        assert!(device
            .updates
            .lock()
            .unwrap()
            .iter()
            .any(|(handle, data)| *handle == scheduler.material_ed_buffer() && data == &vec![9u8, 8, 7]));
    }
}
