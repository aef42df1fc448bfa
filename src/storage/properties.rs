//! Per-property reads and writes.
//!
//! Storage-local properties resolve against the composed object info or
//! fixed constants; everything else is the metadata store's business. A
//! filename write is special: it is a rename, and the store owns renames.

use super::FsStorage;
use crate::collaborators::PropSlot;
use crate::error::{ResponseCode, Result};
use crate::formats;
use crate::object_info::{THUMB_HEIGHT, THUMB_MAX_SIZE, THUMB_WIDTH};
use crate::types::{ObjectFormat, ObjectHandle, ObjectPropCode, PropValue};
use std::collections::BTreeMap;
use std::path::Path;

/// FourCC of the wmv3 codec, the only one reported.
const FOURCC_WMV3: u32 = 0x574D_5633;

impl FsStorage {
    /// GetObjectPropValue for a batch of properties. Slots the storage can
    /// answer are filled here; the rest go to the metadata store in one
    /// call.
    pub fn get_property_values(&mut self, handle: ObjectHandle, slots: &mut [PropSlot]) -> Result<()> {
        let Some(node) = self.tree.node(handle) else {
            return Err(ResponseCode::GeneralError);
        };
        let path = node.path.clone();

        for slot in slots.iter_mut() {
            match self.property_from_storage(handle, slot.code) {
                Ok(value) => slot.value = value,
                // The metadata store may still know it.
                Err(ResponseCode::ObjectPropNotSupported) => {}
                Err(error) => return Err(error),
            }
        }

        self.metadata.get_prop_vals(&path, slots);
        Ok(())
    }

    /// Bulk property read for every child of an association, with one
    /// batched metadata-store query. Storage-local values win; batch
    /// results only fill slots still empty.
    pub fn get_child_property_values(
        &mut self,
        parent: ObjectHandle,
        props: &[ObjectPropCode],
    ) -> Result<BTreeMap<ObjectHandle, Vec<PropValue>>> {
        if !self.tree.contains(parent) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        if !self.node_format(parent).is_association() {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        let parent_path = self.tree.node(parent).expect("checked").path.clone();

        let mut values = BTreeMap::new();
        for child in self.tree.children(parent) {
            let mut child_values = Vec::with_capacity(props.len());
            for &prop in props {
                child_values.push(self.property_from_storage(child, prop).unwrap_or(PropValue::Empty));
            }
            values.insert(child, child_values);
        }

        let supported: Vec<ObjectPropCode> = props
            .iter()
            .copied()
            .filter(|&prop| self.metadata.supports_property(prop))
            .collect();
        if supported.is_empty() {
            return Ok(values);
        }

        let batch = self.metadata.get_child_prop_vals(&parent_path, &supported);
        if batch.is_empty() {
            return Ok(values);
        }

        for (&child, child_values) in values.iter_mut() {
            let Some(child_path) = self.tree.node(child).map(|node| node.path.clone()) else {
                continue;
            };
            let Some(batch_values) = batch.get(&child_path) else {
                log::info!("Object {child_path} not found in metadata result set");
                continue;
            };
            let mut batch_iter = batch_values.iter();
            for (index, &prop) in props.iter().enumerate() {
                if !self.metadata.supports_property(prop) {
                    continue;
                }
                let Some(batch_value) = batch_iter.next() else { break };
                if child_values[index].is_empty() {
                    child_values[index] = batch_value.clone();
                }
            }
        }

        Ok(values)
    }

    /// SetObjectPropValue / SendObjectPropList. A filename slot renames
    /// the object; other slots go to the metadata store, individually or
    /// as one batch when `send_object_prop_list` is set.
    pub fn set_property_values(
        &mut self,
        handle: ObjectHandle,
        slots: &[PropSlot],
        send_object_prop_list: bool,
    ) -> Result<()> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::GeneralError);
        }

        for slot in slots {
            if slot.code == ObjectPropCode::ObjectFileName {
                let PropValue::Str(new_name) = &slot.value else {
                    return Err(ResponseCode::InvalidObjectPropValue);
                };
                self.rename_object(handle, new_name)?;
            } else if !send_object_prop_list {
                let path = self.tree.node(handle).expect("checked").path.clone();
                self.metadata.set_property(&path, slot.code, &slot.value);
            }
        }

        if send_object_prop_list {
            let path = self.tree.node(handle).expect("checked").path.clone();
            self.metadata.set_prop_vals(&path, slots);
        }
        Ok(())
    }

    // ── Storage-resolved reads ───────────────────────────────────────

    fn property_from_storage(&mut self, handle: ObjectHandle, prop: ObjectPropCode) -> Result<PropValue> {
        if !self.tree.contains(handle) {
            return Err(ResponseCode::InvalidObjectHandle);
        }
        self.ensure_object_info(handle);
        let node = self.tree.node(handle).expect("checked");
        let Some(info) = node.object_info.as_ref() else {
            return Err(ResponseCode::GeneralError);
        };

        let value = match prop {
            ObjectPropCode::AssociationDesc => PropValue::U32(0),
            ObjectPropCode::AssociationType => PropValue::U16(info.association_type),
            ObjectPropCode::ParentObject => PropValue::U32(info.parent_object),
            ObjectPropCode::ObjectSize => PropValue::U64(info.compressed_size),
            ObjectPropCode::StorageId => PropValue::U32(info.storage_id),
            ObjectPropCode::ObjectFormat => PropValue::U16(info.object_format.code()),
            ObjectPropCode::ProtectionStatus => PropValue::U16(info.protection_status),
            ObjectPropCode::AllowedFolderContents => PropValue::U16Array(Vec::new()),
            ObjectPropCode::DateModified => PropValue::Str(info.modification_date.clone()),
            ObjectPropCode::DateCreated | ObjectPropCode::DateAdded => PropValue::Str(info.capture_date.clone()),
            ObjectPropCode::ObjectFileName => PropValue::Str(info.file_name.clone()),
            ObjectPropCode::RepSampleFormat => PropValue::U16(ObjectFormat::Jfif.code()),
            ObjectPropCode::RepSampleSize => PropValue::U32(THUMB_MAX_SIZE),
            ObjectPropCode::RepSampleHeight => PropValue::U32(THUMB_HEIGHT),
            ObjectPropCode::RepSampleWidth => PropValue::U32(THUMB_WIDTH),
            ObjectPropCode::VideoFourCcCodec => PropValue::U32(FOURCC_WMV3),
            ObjectPropCode::CorruptUnplayable | ObjectPropCode::Hidden | ObjectPropCode::NonConsumable => {
                PropValue::U8(0)
            }
            ObjectPropCode::PersistentUniqueObjectId => PropValue::Puoid(node.puoid),
            ObjectPropCode::RepSampleData => {
                let path = node.path.clone();
                let format = info.object_format;
                PropValue::Bytes(self.thumbnail_bytes(&path, format))
            }
            _ => return Err(ResponseCode::ObjectPropNotSupported),
        };
        Ok(value)
    }

    /// Thumbnail file contents, empty when no thumbnail is available.
    fn thumbnail_bytes(&self, path: &str, format: ObjectFormat) -> Vec<u8> {
        let Some(mime) = formats::mime_for_image(format) else {
            return Vec::new();
        };
        self.thumbnailer
            .request_thumbnail(Path::new(path), mime)
            .and_then(|thumb| std::fs::read(thumb).ok())
            .unwrap_or_default()
    }

    // ── Rename ───────────────────────────────────────────────────────

    fn rename_object(&mut self, handle: ObjectHandle, new_name: &str) -> Result<()> {
        self.ensure_object_info(handle);
        let (old_path, parent, is_playlist) = {
            let node = self.tree.node(handle).expect("validated by caller");
            (
                node.path.clone(),
                node.parent,
                self.node_format(handle).is_abstract_playlist(),
            )
        };

        if !self.is_file_name_valid(new_name, parent) {
            log::warn!("Bad file name in set_property_values: {new_name}");
            return Err(ResponseCode::InvalidObjectPropValue);
        }

        let new_path = format!("{}/{new_name}", super::parent_path_of(&old_path));
        if std::fs::rename(&old_path, &new_path).is_err() {
            // Tolerated: the initiator retries or gives up, the tree stays
            // consistent with the filesystem.
            log::warn!("Rename {old_path} -> {new_path} failed");
            return Ok(());
        }

        self.tree.reindex_path(&old_path, &new_path, handle);
        self.puoids.rename(&old_path, &new_path);
        self.metadata.move_path(&old_path, &new_path);
        if is_playlist {
            self.metadata.move_playlist(&old_path, &new_path);
        }
        if let Some(node) = self.tree.node_mut(handle) {
            node.path = new_path.clone();
            if let Some(info) = node.object_info.as_mut() {
                info.file_name = new_name.to_string();
            }
        }

        for child in self.tree.children(handle) {
            self.adjust_moved_paths(child, &new_path, true);
        }
        self.remove_watch_recursively(handle);
        self.add_watch_recursively(handle);
        Ok(())
    }

    /// A file name is valid when it has no illegal characters, is not made
    /// of dots only, and does not collide with a sibling.
    fn is_file_name_valid(&self, name: &str, parent: Option<ObjectHandle>) -> bool {
        if name.is_empty() || name.chars().all(|c| c == '.') {
            return false;
        }
        let illegal = |c: char| matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 0x20;
        if name.chars().any(illegal) {
            return false;
        }
        if let Some(parent) = parent {
            if let Some(parent_node) = self.tree.node(parent) {
                if self.tree.handle_at(&format!("{}/{name}", parent_node.path)).is_some() {
                    return false;
                }
            }
        }
        true
    }
}
