//! A render-thread worker: owns its own pipeline-state cache
//! and a queue of scheduled passes, spins on each pass's declared
//! dependencies before recording it, and reports back to the dispatcher
//! through the same kind of CAS-guarded state machine the shader cache
//! uses for its hashmap lock. Grounded method-for-method on
//! `Dusk/Graphics/FrameGraph.cpp`'s `FrameGraphRenderThread::workerThread`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use pyrite_core::device::Device;
use pyrite_core::filesystem::Filesystem;
use pyrite_pso_cache::PipelineStateCache;
use pyrite_shader_cache::ShaderBackendDir;

pub const STATE_READY: u8 = 0;
pub const STATE_HAS_JOB_TO_DO: u8 = 1;
pub const STATE_BUSY: u8 = 2;
pub const STATE_WAITING_SHUTDOWN: u8 = 3;

pub const PASS_PENDING: u8 = 0;
pub const PASS_IN_PROGRESS: u8 = 1;
pub const PASS_DONE: u8 = 2;

/// A render pass, scheduled and ready to execute: its own execution-state
/// cell (another worker's dependency spin-wait polls this one) plus the
/// execution-state cells of whatever it depends on.
pub struct ScheduledPass<D: Device, F: Filesystem> {
    pub name: String,
    pub execution_state: Arc<AtomicU8>,
    pub dependencies: Vec<Arc<AtomicU8>>,
    pub execute: Arc<dyn Fn(&mut D::CommandList, &mut PipelineStateCache<D, F>) + Send + Sync>,
}

impl<D: Device, F: Filesystem> ScheduledPass<D, F> {
    pub fn new(
        name: impl Into<String>,
        dependencies: Vec<Arc<AtomicU8>>,
        execute: Arc<dyn Fn(&mut D::CommandList, &mut PipelineStateCache<D, F>) + Send + Sync>,
    ) -> Self {
        ScheduledPass {
            name: name.into(),
            execution_state: Arc::new(AtomicU8::new(PASS_PENDING)),
            dependencies,
            execute,
        }
    }
}

struct WorkerShared<D: Device, F: Filesystem> {
    state: AtomicU8,
    queue: Mutex<VecDeque<ScheduledPass<D, F>>>,
    command_list: Mutex<Option<D::CommandList>>,
}

/// component J. Spawns a genuine OS thread in `spawn`, joined in `Drop` —
/// the original spawns `std::thread` in its constructor and joins it in its
/// destructor, not a cooperative "tick" abstraction.
pub struct Worker<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    shared: Arc<WorkerShared<D, F>>,
    handle: Option<JoinHandle<()>>,
}

impl<D, F> Worker<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        device: D,
        filesystem: F,
        backend_dir: ShaderBackendDir,
        disable_pipeline_cache: bool,
        fallback_vertex_hash: &str,
        fallback_pixel_hash: &str,
        fallback_compute_hash: &str,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            state: AtomicU8::new(STATE_READY),
            queue: Mutex::new(VecDeque::new()),
            command_list: Mutex::new(None),
        });

        let pso_cache = PipelineStateCache::new(
            device,
            filesystem,
            backend_dir,
            disable_pipeline_cache,
            fallback_vertex_hash,
            fallback_pixel_hash,
            fallback_compute_hash,
        );

        let thread_shared = shared.clone();
        let handle = thread::spawn(move || {
            let mut pso_cache = pso_cache;
            worker_loop(thread_shared, &mut pso_cache)
        });

        Worker { shared, handle: Some(handle) }
    }

    pub fn is_ready(&self) -> bool {
        self.shared
            .state
            .compare_exchange_weak(STATE_READY, STATE_READY, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn has_work_todo(&self) -> bool {
        !self.shared.queue.lock().unwrap().is_empty()
    }

    pub fn enqueue_render_pass(&self, pass: ScheduledPass<D, F>) {
        self.shared.queue.lock().unwrap().push_back(pass);
    }

    /// Hands the worker a command list already moved into its `begin()`
    /// state and flips `Ready -> HasJobToDo`.
    pub fn flush(&self, command_list: D::CommandList) {
        *self.shared.command_list.lock().unwrap() = Some(command_list);
        let result = self.shared.state.compare_exchange(
            STATE_READY,
            STATE_HAS_JOB_TO_DO,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        assert!(result.is_ok(), "failed to flush render jobs: the worker is still busy");
    }

    /// Takes the command list back out once the worker reports `Ready`
    /// again; the worker has already called `end()` on it.
    pub fn take_command_list(&self) -> Option<D::CommandList> {
        self.shared.command_list.lock().unwrap().take()
    }
}

impl<D, F> Drop for Worker<D, F>
where
    D: Device + Clone + Send + Sync + 'static,
    F: Filesystem + Clone + Send + Sync + 'static,
    D::CommandList: Send,
{
    fn drop(&mut self) {
        self.shared.state.store(STATE_WAITING_SHUTDOWN, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<D, F>(shared: Arc<WorkerShared<D, F>>, pso_cache: &mut PipelineStateCache<D, F>)
where
    D: Device,
    F: Filesystem,
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

        shared.state.store(STATE_BUSY, Ordering::Release);

        let mut command_list = shared
            .command_list
            .lock()
            .unwrap()
            .take()
            .expect("worker flushed into HasJobToDo with no command list bound");

        let jobs: VecDeque<ScheduledPass<D, F>> = std::mem::take(&mut *shared.queue.lock().unwrap());

        for pass in jobs {
            for dependency in &pass.dependencies {
                while dependency.load(Ordering::Acquire) != PASS_DONE {
                    thread::yield_now();
                }
            }

            pass.execution_state.store(PASS_IN_PROGRESS, Ordering::Release);
            (pass.execute)(&mut command_list, pso_cache);
            pass.execution_state.store(PASS_DONE, Ordering::Release);
        }

        *shared.command_list.lock().unwrap() = Some(command_list);
        shared.state.store(STATE_READY, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::device::{
        BufferDesc, BufferHandle, CommandList as CommandListTrait, ImageDesc, ImageHandle, ImageViewDesc,
        ImageViewFlags, PipelineDescriptor, PipelineStateBlob, PipelineStateHandle, SamplerDesc, SamplerHandle,
        ShaderStage,
    };
    use pyrite_core::error::{CoreError, DeviceError};
    use pyrite_core::filesystem::{FileOpenMode, FsObject};
    use std::io::{Cursor, Read, Seek, SeekFrom, Write};
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

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
        fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32) {
            self.0.lock().unwrap().push("draw".into());
        }
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
    }

    impl MockDevice {
        fn new() -> Self {
            MockDevice { next: Arc::new(AtomicU64::new(1)) }
        }
    }

    impl Device for MockDevice {
        type CommandList = MockCommandList;

        fn create_buffer(&self, _desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
            Ok(BufferHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_buffer(&self, _buffer: BufferHandle) {}
        fn update_buffer(&self, _buffer: BufferHandle, _offset: u64, _data: &[u8]) {}

        fn create_image(&self, _desc: &ImageDesc) -> Result<ImageHandle, DeviceError> {
            Ok(ImageHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_image(&self, _image: ImageHandle) {}
        fn create_image_view(
            &self,
            _image: ImageHandle,
            _view_desc: &ImageViewDesc,
            _flags: ImageViewFlags,
        ) -> Result<(), DeviceError> {
            Ok(())
        }
        fn copy_image(&self, _src: ImageHandle, _dst: ImageHandle) {}
        fn resolve_image(&self, _src: ImageHandle, _dst: ImageHandle) {}

        fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
            Ok(SamplerHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_sampler(&self, _sampler: SamplerHandle) {}

        fn create_shader(
            &self,
            _stage: ShaderStage,
            _bytecode: &[u8],
        ) -> Result<pyrite_core::device::ShaderHandle, DeviceError> {
            Ok(pyrite_core::device::ShaderHandle(self.next.fetch_add(1, Ordering::SeqCst)))
        }
        fn destroy_shader(&self, _shader: pyrite_core::device::ShaderHandle) {}

        fn create_pipeline_state(
            &self,
            _descriptor: &PipelineDescriptor,
            _shaders: &[pyrite_core::device::ShaderHandle],
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
        fn submit_command_lists(&self, _lists: Vec<Self::CommandList>) {}

        fn get_swapchain_buffer(&self) -> ImageHandle {
            ImageHandle(0)
        }
        fn present(&self) {}
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
        files: Arc<StdMutex<std::collections::HashMap<String, Vec<u8>>>>,
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

    fn spawn_worker() -> Worker<MockDevice, MockFilesystem> {
        Worker::spawn(
            MockDevice::new(),
            MockFilesystem::default(),
            ShaderBackendDir::Spirv,
            true,
            "fallback_vertex",
            "fallback_pixel",
            "fallback_compute",
        )
    }

    #[test]
    fn worker_starts_ready_with_no_work() {
        let worker = spawn_worker();
        assert!(worker.is_ready());
        assert!(!worker.has_work_todo());
    }

    #[test]
    fn a_flushed_pass_runs_and_worker_returns_to_ready() {
        let worker = spawn_worker();
        let executed = Arc::new(AtomicU64::new(0));
        let executed_clone = executed.clone();

        let pass = ScheduledPass::new(
            "solo",
            Vec::new(),
            Arc::new(move |cmd_list: &mut MockCommandList, _pso: &mut PipelineStateCache<MockDevice, MockFilesystem>| {
                cmd_list.draw(3, 1, 0);
                executed_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        worker.enqueue_render_pass(pass);
        let cmd_list = MockCommandList::default();
        let log = cmd_list.0.clone();
        worker.flush(cmd_list);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !worker.is_ready() && std::time::Instant::now() < deadline {
            thread::yield_now();
        }

        assert!(worker.is_ready());
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert!(log.lock().unwrap().contains(&"draw".to_string()));
        assert!(worker.take_command_list().is_some());
    }

    #[test]
    fn a_pass_waits_for_its_dependency_to_report_done() {
        let worker = spawn_worker();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let dependency_state = Arc::new(AtomicU8::new(PASS_PENDING));
        let order_a = order.clone();
        let pass_a = ScheduledPass {
            name: "a".into(),
            execution_state: dependency_state.clone(),
            dependencies: Vec::new(),
            execute: Arc::new(move |_cmd, _pso| {
                order_a.lock().unwrap().push("a");
            }),
        };

        let order_b = order.clone();
        let pass_b = ScheduledPass::new(
            "b",
            vec![dependency_state],
            Arc::new(move |_cmd, _pso| {
                order_b.lock().unwrap().push("b");
            }),
        );

        worker.enqueue_render_pass(pass_a);
        worker.enqueue_render_pass(pass_b);
        worker.flush(MockCommandList::default());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !worker.is_ready() && std::time::Instant::now() < deadline {
            thread::yield_now();
        }

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }
}
