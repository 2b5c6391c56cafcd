//! Dispatching host requests to volumes
//!
//! The registry owns one [`Volume`] per mounted `file_system_id` and is the
//! single entry point the host glue drives with decoded messages. It runs on
//! the host-message thread; everything that can block is forwarded to the
//! volumes' workers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use arcmount_protocol::HostRequest;

use crate::adapter::AdapterFactory;
use crate::config::VolumeConfig;
use crate::error::EngineError;
use crate::host::HostSender;
use crate::volume::Volume;

pub struct VolumeRegistry {
    volumes: HashMap<String, Volume>,
    sender: Arc<dyn HostSender>,
    adapter_factory: Arc<dyn AdapterFactory>,
    config: VolumeConfig,
}

impl VolumeRegistry {
    pub fn new(
        sender: Arc<dyn HostSender>,
        adapter_factory: Arc<dyn AdapterFactory>,
        config: VolumeConfig,
    ) -> Self {
        Self {
            volumes: HashMap::new(),
            sender,
            adapter_factory,
            config,
        }
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn handle_request(&mut self, request: HostRequest) {
        match request {
            HostRequest::ReadMetadata {
                file_system_id,
                request_id,
                archive_size,
            } => self.read_metadata(file_system_id, &request_id, archive_size),

            HostRequest::ReadChunkDone {
                file_system_id,
                request_id,
                chunk_buffer,
                offset,
            } => {
                // Volume already unmounted: routine for read-ahead answers.
                if let Some(volume) = self.volumes.get(&file_system_id) {
                    volume.deliver_chunk(&request_id, chunk_buffer, offset);
                }
            }

            HostRequest::ReadChunkError {
                file_system_id,
                request_id,
            } => {
                if let Some(volume) = self.volumes.get(&file_system_id) {
                    volume.deliver_chunk_error(&request_id);
                }
            }

            HostRequest::OpenFile {
                file_system_id,
                request_id,
                file_path,
                archive_size,
            } => {
                if let Some(volume) = self.volumes.get(&file_system_id) {
                    volume.open_file(&request_id, &file_path, archive_size);
                } else {
                    warn!(%file_system_id, "open_file before read_metadata");
                }
            }

            HostRequest::CloseFile {
                file_system_id,
                request_id,
                open_request_id,
            } => {
                if let Some(volume) = self.volumes.get(&file_system_id) {
                    volume.close_file(&request_id, &open_request_id);
                } else {
                    warn!(%file_system_id, "close_file for unknown volume");
                }
            }

            HostRequest::ReadFile {
                file_system_id,
                request_id,
                open_request_id,
                offset,
                length,
            } => {
                if let Some(volume) = self.volumes.get(&file_system_id) {
                    volume.read_file(&request_id, &open_request_id, offset, length);
                } else {
                    warn!(%file_system_id, "read_file for unknown volume");
                }
            }

            HostRequest::CloseVolume { file_system_id } => {
                debug!(%file_system_id, "closing volume");
                // Dropping joins the worker and tears down live sessions.
                self.volumes.remove(&file_system_id);
            }
        }
    }

    /// Mounts a volume and starts its metadata scan. The first request for a
    /// `file_system_id` is what creates the volume.
    fn read_metadata(&mut self, file_system_id: String, request_id: &str, archive_size: i64) {
        if self.volumes.contains_key(&file_system_id) {
            // The host re-mounted without closing; replace the stale volume.
            warn!(%file_system_id, "read_metadata for an already mounted volume");
            self.volumes.remove(&file_system_id);
        }

        let volume = match Volume::new(
            file_system_id.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.adapter_factory),
            self.config,
        ) {
            Ok(volume) => volume,
            Err(error) => {
                debug_assert!(matches!(error, EngineError::CreateVolume(_)));
                self.sender
                    .send(arcmount_protocol::HostResponse::FileSystemError {
                        file_system_id,
                        request_id: request_id.to_owned(),
                        error: error.to_string(),
                    });
                return;
            }
        };

        volume.read_metadata(request_id, archive_size);
        self.volumes.insert(file_system_id, volume);
    }
}
