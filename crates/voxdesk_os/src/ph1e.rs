#![forbid(unsafe_code)]

use voxdesk_engines::ph1e::{
    InMemoryEventCalendar, InMemoryTaskBoard, OfflineWeather, OpenMeteoWeather,
};
use voxdesk_kernel_contracts::ph1e::{EventRecord, ServiceError, TaskRecord, WeatherReport};
use voxdesk_kernel_contracts::ph1x::Notification;

pub trait TaskService {
    /// Idempotent: adding the same record twice leaves one task.
    fn add(&mut self, task: &TaskRecord) -> Result<String, ServiceError>;
    fn list(&mut self) -> Result<Vec<TaskRecord>, ServiceError>;
}

pub trait EventService {
    fn add(&mut self, event: &EventRecord) -> Result<String, ServiceError>;
    fn list(&mut self) -> Result<Vec<EventRecord>, ServiceError>;
}

pub trait WeatherService {
    fn lookup(&mut self, location: &str) -> Result<WeatherReport, ServiceError>;
}

/// One-way updates for an observing display. Delivery order must be preserved.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

impl TaskService for InMemoryTaskBoard {
    fn add(&mut self, task: &TaskRecord) -> Result<String, ServiceError> {
        InMemoryTaskBoard::add(self, task.clone())
    }

    fn list(&mut self) -> Result<Vec<TaskRecord>, ServiceError> {
        Ok(InMemoryTaskBoard::list(self))
    }
}

impl EventService for InMemoryEventCalendar {
    fn add(&mut self, event: &EventRecord) -> Result<String, ServiceError> {
        InMemoryEventCalendar::add(self, event.clone())
    }

    fn list(&mut self) -> Result<Vec<EventRecord>, ServiceError> {
        Ok(InMemoryEventCalendar::list(self))
    }
}

impl WeatherService for OfflineWeather {
    fn lookup(&mut self, location: &str) -> Result<WeatherReport, ServiceError> {
        OfflineWeather::lookup(self, location)
    }
}

impl WeatherService for OpenMeteoWeather {
    fn lookup(&mut self, location: &str) -> Result<WeatherReport, ServiceError> {
        OpenMeteoWeather::lookup(self, location)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoNotifications;

impl NotificationSink for NoNotifications {
    fn notify(&mut self, _notification: Notification) {}
}

impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}
