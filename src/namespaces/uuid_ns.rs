use uuid::Uuid;

use crate::error::Error;
use crate::registry::NamespaceModule;
use crate::Codec;

const TYPE_ID_UUID: u32 = 1;

/// Build the `uuid` namespace module, encoding a [`Uuid`] as its 16 raw bytes.
pub fn module() -> NamespaceModule {
    NamespaceModule::new("uuid").register::<Uuid, _, _>(TYPE_ID_UUID, encode_uuid, decode_uuid)
}

fn encode_uuid(_codec: &Codec, value: &Uuid) -> Result<Vec<u8>, Error> {
    Ok(value.as_bytes().to_vec())
}

fn decode_uuid(_codec: &Codec, data: &[u8]) -> Result<Uuid, Error> {
    let bytes: [u8; 16] = data
        .try_into()
        .map_err(|_| Error::MalformedExtension("uuid payload must be 16 bytes"))?;
    Ok(Uuid::from_bytes(bytes))
}
