use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Ticker, Timer};
use embedded_hal::i2c::{ErrorKind, I2c};

use crate::{channel::Channels, config::Timing};

/// One timestamped temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    pub timestamp: Instant,
}

impl Reading {
    pub const fn new(temperature: f32, humidity: f32, timestamp: Instant) -> Self {
        Self {
            temperature,
            humidity,
            timestamp,
        }
    }

    pub fn is_plausible(&self) -> bool {
        self.temperature.is_finite() && self.humidity.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    Bus(ErrorKind),
    /// The sensor had not finished its measurement.
    Busy,
    Checksum,
    /// The sensor answered with values that are not numbers.
    Implausible,
}

fn bus<E: embedded_hal::i2c::Error>(e: E) -> SensorError {
    SensorError::Bus(e.kind())
}

/// Anything that can be polled for a reading.
pub trait Sensor {
    async fn poll(&mut self) -> Result<Reading, SensorError>;
}

const DHT20_ADDRESS: u8 = 0x38;
const TRIGGER_MEASUREMENT: [u8; 3] = [0xAC, 0x33, 0x00];
const STATUS_BUSY: u8 = 0x80;
const STATUS_CALIBRATED: u8 = 0x18;
const CALIBRATION_REGISTERS: [u8; 3] = [0x1B, 0x1C, 0x1E];
const MEASUREMENT_TIME: Duration = Duration::from_millis(80);
const FULL_SCALE: f32 = 1_048_576.0; // 2^20

/// Aosong DHT20 on I2C.
pub struct Dht20<I2C> {
    i2c: I2C,
    calibrated: bool,
}

impl<I2C: I2c> Dht20<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            calibrated: false,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn status(&mut self) -> Result<u8, SensorError> {
        let mut status = [0u8; 1];
        self.i2c.read(DHT20_ADDRESS, &mut status).map_err(bus)?;
        Ok(status[0])
    }

    async fn ensure_calibrated(&mut self) -> Result<(), SensorError> {
        if self.calibrated {
            return Ok(());
        }

        let status = self.status()?;
        if status & STATUS_CALIBRATED != STATUS_CALIBRATED {
            log::info!("DHT20 status {:#04x}, resetting calibration registers", status);
            for register in CALIBRATION_REGISTERS {
                self.reset_register(register).await?;
            }
        }

        self.calibrated = true;
        Ok(())
    }

    async fn reset_register(&mut self, register: u8) -> Result<(), SensorError> {
        self.i2c
            .write(DHT20_ADDRESS, &[register, 0x00, 0x00])
            .map_err(bus)?;
        Timer::after(Duration::from_millis(5)).await;

        let mut value = [0u8; 3];
        self.i2c.read(DHT20_ADDRESS, &mut value).map_err(bus)?;
        Timer::after(Duration::from_millis(10)).await;

        self.i2c
            .write(DHT20_ADDRESS, &[0xB0 | register, value[1], value[2]])
            .map_err(bus)?;
        Timer::after(Duration::from_millis(5)).await;
        Ok(())
    }
}

impl<I2C: I2c> Sensor for Dht20<I2C> {
    async fn poll(&mut self) -> Result<Reading, SensorError> {
        self.ensure_calibrated().await?;

        self.i2c
            .write(DHT20_ADDRESS, &TRIGGER_MEASUREMENT)
            .map_err(bus)?;
        Timer::after(MEASUREMENT_TIME).await;

        let mut frame = [0u8; 7];
        self.i2c.read(DHT20_ADDRESS, &mut frame).map_err(bus)?;

        let (temperature, humidity) = decode(&frame)?;
        Ok(Reading::new(temperature, humidity, Instant::now()))
    }
}

/// Frame layout: status, 20 bits humidity, 20 bits temperature, CRC.
fn decode(frame: &[u8; 7]) -> Result<(f32, f32), SensorError> {
    if frame[0] & STATUS_BUSY != 0 {
        return Err(SensorError::Busy);
    }
    if crc8(&frame[..6]) != frame[6] {
        return Err(SensorError::Checksum);
    }

    let raw_humidity =
        (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temperature =
        (u32::from(frame[3] & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    let humidity = raw_humidity as f32 * 100.0 / FULL_SCALE;
    let temperature = raw_temperature as f32 * 200.0 / FULL_SCALE - 50.0;
    Ok((temperature, humidity))
}

// CRC-8, polynomial 0x31, init 0xFF
fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0xFFu8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Result of one monitor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Nothing was published.
    Skipped(SensorError),
    /// Both notifications were signalled; `queued` tells whether the display
    /// queue took the reading.
    Published { queued: bool },
}

/// The producer: sole writer of sensor data.
pub struct Monitor<'a, M: RawMutex, S> {
    sensor: S,
    channels: &'a Channels<M>,
    timing: Timing,
    cycles: u32,
}

impl<'a, M: RawMutex, S: Sensor> Monitor<'a, M, S> {
    pub fn new(sensor: S, channels: &'a Channels<M>, timing: Timing) -> Self {
        Self {
            sensor,
            channels,
            timing,
            cycles: 0,
        }
    }

    /// Polls once and publishes on success.
    pub async fn cycle(&mut self) -> Cycle {
        self.cycles = self.cycles.wrapping_add(1);

        let reading = match self.sensor.poll().await {
            Ok(reading) if reading.is_plausible() => reading,
            Ok(reading) => {
                log::warn!(
                    "Sensor returned implausible values in cycle {}: {:?}",
                    self.cycles,
                    reading
                );
                return Cycle::Skipped(SensorError::Implausible);
            }
            Err(e) => {
                log::warn!("Failed to read sensor in cycle {}: {:?}", self.cycles, e);
                return Cycle::Skipped(e);
            }
        };

        log::info!(
            "Humidity: {}%  Temperature: {}°C",
            reading.humidity,
            reading.temperature
        );
        self.publish(reading).await
    }

    async fn publish(&self, reading: Reading) -> Cycle {
        self.channels.temperature.signal(reading.temperature);
        self.channels.humidity.signal(reading.humidity);

        let queued = self
            .channels
            .readings
            .try_send(reading, self.timing.queue_send_timeout)
            .await;
        if queued {
            log::debug!("Reading queued for display");
        } else {
            log::warn!("Display queue full, reading dropped");
        }

        Cycle::Published { queued }
    }

    pub async fn run(mut self) -> ! {
        log::info!(
            "Temperature/humidity monitor started, polling every {} ms",
            self.timing.poll_period.as_millis()
        );

        let mut ticker = Ticker::every(self.timing.poll_period);
        loop {
            self.cycle().await;
            ticker.next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource, Operation};
    use std::collections::VecDeque;

    struct FakeBus {
        status: u8,
        frame: [u8; 7],
        writes: Vec<Vec<u8>>,
        fail: bool,
    }

    impl FakeBus {
        fn new(status: u8, frame: [u8; 7]) -> Self {
            Self {
                status,
                frame,
                writes: Vec::new(),
                fail: false,
            }
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            assert_eq!(address, DHT20_ADDRESS);
            if self.fail {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => self.writes.push(bytes.to_vec()),
                    Operation::Read(buffer) => match buffer.len() {
                        1 => buffer[0] = self.status,
                        7 => buffer.copy_from_slice(&self.frame),
                        _ => buffer.fill(0),
                    },
                }
            }
            Ok(())
        }
    }

    fn frame(status: u8, raw_humidity: u32, raw_temperature: u32) -> [u8; 7] {
        let mut frame = [
            status,
            (raw_humidity >> 12) as u8,
            (raw_humidity >> 4) as u8,
            (((raw_humidity & 0x0F) << 4) as u8) | ((raw_temperature >> 16) as u8 & 0x0F),
            (raw_temperature >> 8) as u8,
            raw_temperature as u8,
            0,
        ];
        frame[6] = crc8(&frame[..6]);
        frame
    }

    #[test]
    fn test_crc8_reference_value() {
        // Sensirion/Aosong reference: 0xBEEF -> 0x92
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_dht20_decodes_measurement() {
        // 2^19 -> 50 %, 0x60000 -> 25 °C
        let bus = FakeBus::new(0x1C, frame(0x1C, 0x80000, 0x60000));
        let mut sensor = Dht20::new(bus);

        let reading = block_on(sensor.poll()).expect("valid frame");

        assert!((reading.humidity - 50.0).abs() < 0.001);
        assert!((reading.temperature - 25.0).abs() < 0.001);
        assert_eq!(sensor.release().writes, vec![TRIGGER_MEASUREMENT.to_vec()]);
    }

    #[test]
    fn test_dht20_reports_busy() {
        let bus = FakeBus::new(0x1C, frame(0x9C, 0x80000, 0x60000));
        let mut sensor = Dht20::new(bus);

        assert_eq!(block_on(sensor.poll()), Err(SensorError::Busy));
    }

    #[test]
    fn test_dht20_rejects_bad_checksum() {
        let mut corrupted = frame(0x1C, 0x80000, 0x60000);
        corrupted[6] ^= 0xFF;
        let mut sensor = Dht20::new(FakeBus::new(0x1C, corrupted));

        assert_eq!(block_on(sensor.poll()), Err(SensorError::Checksum));
    }

    #[test]
    fn test_dht20_resets_calibration_once() {
        let bus = FakeBus::new(0x00, frame(0x1C, 0x80000, 0x60000));
        let mut sensor = Dht20::new(bus);

        block_on(sensor.poll()).expect("first poll");
        block_on(sensor.poll()).expect("second poll");

        let writes = sensor.release().writes;
        assert_eq!(
            writes,
            vec![
                vec![0x1B, 0, 0],
                vec![0xBB, 0, 0],
                vec![0x1C, 0, 0],
                vec![0xBC, 0, 0],
                vec![0x1E, 0, 0],
                vec![0xBE, 0, 0],
                TRIGGER_MEASUREMENT.to_vec(),
                TRIGGER_MEASUREMENT.to_vec(),
            ]
        );
    }

    #[test]
    fn test_dht20_bus_error() {
        let mut bus = FakeBus::new(0x1C, frame(0x1C, 0, 0));
        bus.fail = true;
        let mut sensor = Dht20::new(bus);

        assert_eq!(
            block_on(sensor.poll()),
            Err(SensorError::Bus(ErrorKind::NoAcknowledge(
                NoAcknowledgeSource::Address
            )))
        );
    }

    struct ScriptedSensor(VecDeque<Result<Reading, SensorError>>);

    impl Sensor for ScriptedSensor {
        async fn poll(&mut self) -> Result<Reading, SensorError> {
            self.0.pop_front().unwrap_or(Err(SensorError::Busy))
        }
    }

    fn instant_timing() -> Timing {
        Timing {
            queue_send_timeout: Duration::from_ticks(0),
            ..Timing::new()
        }
    }

    #[test]
    fn test_monitor_failure_publishes_nothing() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let sensor = ScriptedSensor(VecDeque::from([Err(SensorError::Checksum)]));
        let mut monitor = Monitor::new(sensor, &channels, instant_timing());

        assert_eq!(
            block_on(monitor.cycle()),
            Cycle::Skipped(SensorError::Checksum)
        );
        assert_eq!(channels.temperature.try_take(), None);
        assert_eq!(channels.humidity.try_take(), None);
        assert_eq!(
            block_on(channels.readings.try_receive(Duration::from_ticks(0))),
            None
        );
    }

    #[test]
    fn test_monitor_skips_implausible_reading() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let bogus = Reading::new(f32::NAN, 40.0, Instant::from_millis(0));
        let sensor = ScriptedSensor(VecDeque::from([Ok(bogus)]));
        let mut monitor = Monitor::new(sensor, &channels, instant_timing());

        assert_eq!(
            block_on(monitor.cycle()),
            Cycle::Skipped(SensorError::Implausible)
        );
        assert!(!channels.temperature.is_pending());
    }

    #[test]
    fn test_monitor_publishes_to_every_channel() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let reading = Reading::new(22.5, 45.0, Instant::from_millis(1000));
        let sensor = ScriptedSensor(VecDeque::from([Ok(reading)]));
        let mut monitor = Monitor::new(sensor, &channels, instant_timing());

        assert_eq!(
            block_on(monitor.cycle()),
            Cycle::Published { queued: true }
        );
        assert_eq!(channels.temperature.try_take(), Some(22.5));
        assert_eq!(channels.humidity.try_take(), Some(45.0));
        assert_eq!(
            block_on(channels.readings.try_receive(Duration::from_ticks(0))),
            Some(reading)
        );
    }

    #[test]
    fn test_monitor_full_queue_does_not_block_notifications() {
        let channels: Channels<CriticalSectionRawMutex> = Channels::new();
        let script = (0..7)
            .map(|i| Ok(Reading::new(20.0 + i as f32, 50.0, Instant::from_millis(i))))
            .collect();
        let mut monitor = Monitor::new(ScriptedSensor(script), &channels, instant_timing());

        let outcomes: Vec<Cycle> = (0..7).map(|_| block_on(monitor.cycle())).collect();

        assert_eq!(outcomes[4], Cycle::Published { queued: true });
        assert_eq!(outcomes[5], Cycle::Published { queued: false });
        assert_eq!(outcomes[6], Cycle::Published { queued: false });
        // the notifications only keep the newest value
        assert_eq!(channels.temperature.try_take(), Some(26.0));
        assert_eq!(channels.temperature.try_take(), None);
        assert_eq!(
            block_on(channels.readings.try_receive(Duration::from_ticks(0)))
                .map(|r| r.temperature),
            Some(20.0)
        );
    }
}
