//! One mounted archive: worker thread, request map, host state machine
//!
//! A [`Volume`] is the session object for one `file_system_id`. All parser
//! work runs on a dedicated worker thread (parser calls block inside the
//! stream reader, which must never happen on the host-message thread); host
//! requests become queued worker tasks executed in arrival order, and host
//! chunk replies are routed through the request map to whichever reader the
//! worker is blocked in.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use arcmount_protocol::{HostResponse, PATH_DELIMITER};

use crate::adapter::{AdapterFactory, ArchiveAdapter};
use crate::cache::HeaderCache;
use crate::config::VolumeConfig;
use crate::error::{EngineError, Result};
use crate::host::HostSender;
use crate::metadata;
use crate::reader::{ChunkRequestor, ChunkStreamReader, DeliveryHandle};

/// A mounted archive session engine.
///
/// Alive with a running worker until dropped; dropping joins the worker and
/// tears down every live session. The host is responsible for answering or
/// erroring every outstanding chunk request before closing a volume, which is
/// what guarantees a blocked read terminates.
pub struct Volume {
    shared: Arc<VolumeShared>,
    tasks: Sender<Task>,
    worker: Option<JoinHandle<()>>,
}

struct VolumeShared {
    file_system_id: String,
    config: VolumeConfig,
    sender: Arc<dyn HostSender>,
    /// Request map: request id -> the delivery entry points of that session's
    /// reader. Written by the worker at session creation/cleanup, read by the
    /// main thread in the two deliver paths. The lock is held across the
    /// delivery call so a session cannot be freed while its reader is poked.
    deliveries: Mutex<HashMap<String, DeliveryHandle>>,
}

impl VolumeShared {
    fn send(&self, response: HostResponse) {
        self.sender.send(response);
    }

    fn send_error(&self, request_id: &str, error: &EngineError) {
        warn!(
            file_system_id = %self.file_system_id,
            request_id,
            %error,
            "operation failed"
        );
        self.send(HostResponse::FileSystemError {
            file_system_id: self.file_system_id.clone(),
            request_id: request_id.to_owned(),
            error: error.to_string(),
        });
    }
}

/// Issues `READ_CHUNK` requests on behalf of a session's reader.
struct HostChunkRequestor {
    shared: Arc<VolumeShared>,
}

impl ChunkRequestor for HostChunkRequestor {
    fn request_chunk(&self, request_id: &str, offset: i64, length: i64) {
        debug_assert!(offset >= 0 && length > 0);
        self.shared.send(HostResponse::ReadChunk {
            file_system_id: self.shared.file_system_id.clone(),
            request_id: request_id.to_owned(),
            offset,
            length,
        });
    }
}

enum Task {
    ReadMetadata {
        request_id: String,
        archive_size: i64,
    },
    OpenFile {
        request_id: String,
        file_path: String,
        archive_size: i64,
    },
    ReadFile {
        request_id: String,
        open_request_id: String,
        offset: i64,
        length: i64,
    },
    CloseFile {
        request_id: String,
        open_request_id: String,
    },
    Shutdown,
}

impl Volume {
    /// Creates the volume and starts its worker thread.
    pub fn new(
        file_system_id: impl Into<String>,
        sender: Arc<dyn HostSender>,
        adapter_factory: Arc<dyn AdapterFactory>,
        config: VolumeConfig,
    ) -> Result<Self> {
        let file_system_id = file_system_id.into();
        let shared = Arc::new(VolumeShared {
            file_system_id: file_system_id.clone(),
            config,
            sender,
            deliveries: Mutex::new(HashMap::new()),
        });

        let (tasks, queue) = unbounded();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("arcmount-volume-{file_system_id}"))
            .spawn(move || worker_loop(worker_shared, adapter_factory, queue))
            .map_err(|_| EngineError::CreateVolume(file_system_id))?;

        Ok(Self {
            shared,
            tasks,
            worker: Some(worker),
        })
    }

    pub fn file_system_id(&self) -> &str {
        &self.shared.file_system_id
    }

    /// Scans the whole archive and replies with the metadata tree.
    ///
    /// No session may already exist for `request_id`.
    pub fn read_metadata(&self, request_id: &str, archive_size: i64) {
        self.enqueue(Task::ReadMetadata {
            request_id: request_id.to_owned(),
            archive_size,
        });
    }

    /// Opens `file_path` in a fresh session kept live until `close_file`.
    pub fn open_file(&self, request_id: &str, file_path: &str, archive_size: i64) {
        self.enqueue(Task::OpenFile {
            request_id: request_id.to_owned(),
            file_path: file_path.to_owned(),
            archive_size,
        });
    }

    /// Streams `length` decompressed bytes starting at `offset` from the file
    /// opened under `open_request_id`.
    pub fn read_file(&self, request_id: &str, open_request_id: &str, offset: i64, length: i64) {
        self.enqueue(Task::ReadFile {
            request_id: request_id.to_owned(),
            open_request_id: open_request_id.to_owned(),
            offset,
            length,
        });
    }

    /// Disposes the session opened under `open_request_id`.
    ///
    /// Runs on the worker like everything else so it cannot overtake an
    /// in-flight read for the same session.
    pub fn close_file(&self, request_id: &str, open_request_id: &str) {
        self.enqueue(Task::CloseFile {
            request_id: request_id.to_owned(),
            open_request_id: open_request_id.to_owned(),
        });
    }

    /// Routes a `READ_CHUNK_DONE` to the session's reader. A chunk for a
    /// session no longer in the map answers read-ahead that outlived its
    /// session (routine after `close_file`) and is dropped.
    pub fn deliver_chunk(&self, request_id: &str, chunk: Bytes, read_offset: i64) {
        let deliveries = self.shared.deliveries.lock();
        match deliveries.get(request_id) {
            Some(handle) => handle.deliver_chunk(chunk, read_offset),
            None => trace!(request_id, "chunk for closed session dropped"),
        }
    }

    /// Routes a `READ_CHUNK_ERROR` to the session's reader, aborting the read
    /// blocked on it. The worker unwinds through the parser and tears the
    /// session down; nothing to do here beyond signaling.
    pub fn deliver_chunk_error(&self, request_id: &str) {
        let deliveries = self.shared.deliveries.lock();
        match deliveries.get(request_id) {
            Some(handle) => handle.deliver_error(),
            None => trace!(request_id, "chunk error for closed session dropped"),
        }
    }

    fn enqueue(&self, task: Task) {
        if self.tasks.send(task).is_err() {
            warn!(
                file_system_id = %self.shared.file_system_id,
                "worker is gone; dropping task"
            );
        }
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        let _ = self.tasks.send(Task::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// One in-flight parser instance, keyed by the request that created it.
struct ArchiveSession {
    request_id: String,
    adapter: Box<dyn ArchiveAdapter>,
}

struct Worker {
    shared: Arc<VolumeShared>,
    adapter_factory: Arc<dyn AdapterFactory>,
    /// Sessions kept open across tasks (one per opened file). Worker-only.
    sessions: HashMap<String, ArchiveSession>,
    /// Shared by every session of this volume. Worker-only.
    header_cache: Rc<HeaderCache>,
}

fn worker_loop(
    shared: Arc<VolumeShared>,
    adapter_factory: Arc<dyn AdapterFactory>,
    queue: Receiver<Task>,
) {
    let header_cache = Rc::new(HeaderCache::new(&shared.config));
    let mut worker = Worker {
        shared,
        adapter_factory,
        sessions: HashMap::new(),
        header_cache,
    };

    for task in queue {
        match task {
            Task::ReadMetadata {
                request_id,
                archive_size,
            } => worker.read_metadata(&request_id, archive_size),
            Task::OpenFile {
                request_id,
                file_path,
                archive_size,
            } => worker.open_file(&request_id, &file_path, archive_size),
            Task::ReadFile {
                request_id,
                open_request_id,
                offset,
                length,
            } => worker.read_file(&request_id, &open_request_id, offset, length),
            Task::CloseFile {
                request_id,
                open_request_id,
            } => worker.close_file(&request_id, &open_request_id),
            Task::Shutdown => break,
        }
    }

    worker.teardown();
}

impl Worker {
    /// Creates a session: reader first, its delivery handle registered before
    /// anything can trigger a chunk request, then the adapter. On init
    /// failure the error is reported and the half-built session reclaimed.
    fn create_session(&mut self, request_id: &str, archive_size: i64) -> Option<ArchiveSession> {
        let requestor = Arc::new(HostChunkRequestor {
            shared: Arc::clone(&self.shared),
        });
        let mut reader = ChunkStreamReader::new(
            request_id,
            archive_size,
            requestor,
            Some(Rc::clone(&self.header_cache)),
            self.shared.config,
        );

        {
            let mut deliveries = self.shared.deliveries.lock();
            // Request ids are unique across live operations; a collision is a
            // host-side bug.
            debug_assert!(!deliveries.contains_key(request_id));
            deliveries.insert(request_id.to_owned(), reader.delivery_handle());
        }
        reader.prime();

        let mut adapter = self
            .adapter_factory
            .create_adapter(request_id, Box::new(reader));
        if let Err(error) = adapter.init() {
            self.shared.send_error(request_id, &error);
            let _ = self.cleanup_session(ArchiveSession {
                request_id: request_id.to_owned(),
                adapter,
            });
            return None;
        }

        debug!(request_id, archive_size, "session created");
        Some(ArchiveSession {
            request_id: request_id.to_owned(),
            adapter,
        })
    }

    /// Unregisters the session and releases its parser and reader.
    fn cleanup_session(&mut self, mut session: ArchiveSession) -> Result<()> {
        self.shared.deliveries.lock().remove(&session.request_id);
        session.adapter.cleanup()
    }

    fn read_metadata(&mut self, request_id: &str, archive_size: i64) {
        let Some(mut session) = self.create_session(request_id, archive_size) else {
            return;
        };

        let mut root = metadata::build_root();
        loop {
            match session.adapter.next_header() {
                Err(error) => {
                    self.shared.send_error(request_id, &error);
                    let _ = self.cleanup_session(session);
                    return;
                }
                Ok(None) => break,
                Ok(Some(entry)) => metadata::insert(
                    &mut root,
                    &entry.path,
                    entry.size,
                    entry.is_directory,
                    entry.modification_time,
                ),
            }
        }

        // This would be the first error for the request, so report it.
        if let Err(error) = self.cleanup_session(session) {
            self.shared.send_error(request_id, &error);
            return;
        }

        self.shared.send(HostResponse::ReadMetadataDone {
            file_system_id: self.shared.file_system_id.clone(),
            request_id: request_id.to_owned(),
            metadata: root,
        });
    }

    fn open_file(&mut self, request_id: &str, file_path: &str, archive_size: i64) {
        let Some(mut session) = self.create_session(request_id, archive_size) else {
            return;
        };

        loop {
            match session.adapter.next_header() {
                Err(error) => {
                    self.shared.send_error(request_id, &error);
                    let _ = self.cleanup_session(session);
                    return;
                }
                Ok(None) => {
                    self.shared
                        .send_error(request_id, &EngineError::FileNotFound(file_path.to_owned()));
                    let _ = self.cleanup_session(session);
                    return;
                }
                Ok(Some(entry)) => {
                    // Entry paths carry no leading delimiter; host paths do.
                    if file_path.strip_prefix(PATH_DELIMITER) == Some(entry.path.as_str()) {
                        break;
                    }
                }
            }
        }

        // Data is obtained by read_file against this session.
        self.sessions.insert(request_id.to_owned(), session);
        self.shared.send(HostResponse::OpenFileDone {
            file_system_id: self.shared.file_system_id.clone(),
            request_id: request_id.to_owned(),
        });
    }

    fn read_file(&mut self, request_id: &str, open_request_id: &str, offset: i64, length: i64) {
        debug_assert!(length > 0, "read_file requires a positive length");

        let shared = Arc::clone(&self.shared);
        // The open must have been processed earlier on this same thread, so
        // absence here is a programmer error on the host side.
        debug_assert!(
            self.sessions.contains_key(open_request_id),
            "read_file for an unopened file"
        );
        let Some(session) = self.sessions.get_mut(open_request_id) else {
            return;
        };

        let mut offset = offset;
        let mut left = length;
        while left > 0 {
            let want = left.min(shared.config.read_chunk_max as i64) as usize;
            let mut buffer = vec![0u8; want];

            match session.adapter.read_data(offset, &mut buffer) {
                Err(error) => {
                    // Keyed by the read's request id, not the open's. The
                    // session stays in the map; close_file disposes it.
                    shared.send_error(request_id, &error);
                    return;
                }
                Ok(read) => {
                    buffer.truncate(read);
                    let has_more_data = left - read as i64 > 0 && read > 0;
                    shared.send(HostResponse::ReadFileDone {
                        file_system_id: shared.file_system_id.clone(),
                        request_id: request_id.to_owned(),
                        read_file_data: Bytes::from(buffer),
                        has_more_data,
                    });

                    if read == 0 {
                        break; // Entry exhausted before `length` was served.
                    }
                    left -= read as i64;
                    offset += read as i64;
                }
            }
        }
    }

    fn close_file(&mut self, request_id: &str, open_request_id: &str) {
        debug_assert!(
            self.sessions.contains_key(open_request_id),
            "close_file for an unopened file"
        );
        let Some(session) = self.sessions.remove(open_request_id) else {
            return;
        };

        match self.cleanup_session(session) {
            Ok(()) => self.shared.send(HostResponse::CloseFileDone {
                file_system_id: self.shared.file_system_id.clone(),
                request_id: request_id.to_owned(),
                open_request_id: open_request_id.to_owned(),
            }),
            Err(error) => self.shared.send_error(request_id, &error),
        }
    }

    fn teardown(&mut self) {
        let sessions: Vec<ArchiveSession> =
            self.sessions.drain().map(|(_, session)| session).collect();
        for session in sessions {
            debug!(request_id = %session.request_id, "tearing down session at volume shutdown");
            let _ = self.cleanup_session(session);
        }
    }
}
