//! Linux peripheral using bluer (BlueZ)

use std::collections::BTreeSet;
use std::sync::Arc;

use bluer::adv::{Advertisement, AdvertisementHandle, Type};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, Service,
};
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BleDriverConfig;
use crate::error::{BleDriverError, BleResult};

use super::IdentityPeripheral;

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

struct PublishedCharacteristic {
    uuid: Uuid,
    value: Arc<RwLock<Vec<u8>>>,
    // Dropping the handle unregisters the service
    _application: ApplicationHandle,
}

pub struct LinuxPeripheral {
    session: Option<bluer::Session>,
    adapter: Option<bluer::Adapter>,
    published: Option<PublishedCharacteristic>,
    advertisement: Option<AdvertisementHandle>,
}

impl LinuxPeripheral {
    pub fn new() -> Self {
        Self {
            session: None,
            adapter: None,
            published: None,
            advertisement: None,
        }
    }

    fn adapter(&self) -> BleResult<&bluer::Adapter> {
        self.adapter
            .as_ref()
            .ok_or(BleDriverError::AdapterNotAvailable)
    }
}

impl Default for LinuxPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityPeripheral for LinuxPeripheral {
    async fn initialize(&mut self, config: &BleDriverConfig) -> BleResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let session = bluer::Session::new().await?;
        let name = session
            .adapter_names()
            .await?
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleDriverError::AdapterNotAvailable)?;
        let adapter = session.adapter(&name)?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter.set_powered(true).await?;
        }

        info!("BlueZ adapter {} initialized for the peripheral role", name);
        self.session = Some(session);
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn publish(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    ) -> BleResult<()> {
        // Unregister the previous service first
        self.published = None;

        let shared = Arc::new(RwLock::new(value));
        let reader = shared.clone();
        let application = Application {
            services: vec![Service {
                uuid: service,
                primary: true,
                characteristics: vec![Characteristic {
                    uuid: characteristic,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: Box::new(move |request| {
                            let value = reader.clone();
                            async move {
                                debug!("Identity read by {}", request.device_address);
                                Ok(value.read().await.clone())
                            }
                            .boxed()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let handle = self.adapter()?.serve_gatt_application(application).await?;
        self.published = Some(PublishedCharacteristic {
            uuid: characteristic,
            value: shared,
            _application: handle,
        });
        info!("Identity service {} published", service);
        Ok(())
    }

    async fn update_value(&mut self, characteristic: Uuid, value: Vec<u8>) -> BleResult<()> {
        let published = self.published.as_ref().ok_or(BleDriverError::NotPublished)?;
        if published.uuid != characteristic {
            return Err(BleDriverError::CharacteristicNotFound {
                characteristic: characteristic.to_string(),
            });
        }
        *published.value.write().await = value;
        debug!("Identity value updated");
        Ok(())
    }

    async fn start_advertising(
        &mut self,
        service: Uuid,
        local_name: Option<&str>,
    ) -> BleResult<()> {
        let advertisement = Advertisement {
            advertisement_type: Type::Peripheral,
            service_uuids: BTreeSet::from([service]),
            local_name: local_name.map(str::to_string),
            discoverable: Some(true),
            ..Default::default()
        };

        let handle = self.adapter()?.advertise(advertisement).await?;
        self.advertisement = Some(handle);
        info!("Started BLE advertising for {}", service);
        Ok(())
    }

    async fn stop_advertising(&mut self) -> BleResult<()> {
        if let Some(handle) = self.advertisement.take() {
            drop(handle);
            info!("Stopped BLE advertising");
        }
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.advertisement.is_some()
    }
}
