use std::io::{Read, Write};

use serde::{de::DeserializeOwned, Serialize};

use crate::fs::{FsError, Result};

/// Trait for digesting an object which stores digest in the object itself
pub trait DigestInSelf {
    fn digest(&mut self);
    fn verify_digest(&mut self) -> bool;
}

/// Trait for serializing and deserializing an object which stores digest in the object itself
/// # Note
/// This trait is implemented for all types implementing
/// [Serialize] and [DeserializeOwned] and [DigestInSelf]
pub trait SerializeAndDigest: Serialize + DeserializeOwned + DigestInSelf {
    /// serialize into a writer implementing [Write](std::io::Write)
    /// # Returns
    /// The number of bytes written if successful
    fn serialize_into<W>(&mut self, w: &mut W) -> Result<usize>
    where
        W: Write,
    {
        self.digest();
        let config = bincode::config::legacy();
        Ok(bincode::serde::encode_into_std_write(self, w, config)?)
    }

    /// deserialize from a reader implementing [Read](std::io::Read)
    /// # Returns
    /// The deserialized object if successful
    fn deserialize_from<R>(r: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let config = bincode::config::legacy();
        let mut object: Self = bincode::serde::decode_from_std_read(r, config)?;
        if !object.verify_digest() {
            Err(FsError::CorruptSnapshot(
                "deserialized object digest verification failed".to_string(),
            ))
        } else {
            Ok(object)
        }
    }
}
