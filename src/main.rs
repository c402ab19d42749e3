#![no_std]
#![no_main]

mod http;

use climate_monitor::{
    display::DisplayPanel,
    lcd::{Lcd1602, DEFAULT_ADDRESS},
    led::LedIndicator,
    pixel::{PixelIndicator, SmartPixel},
    sensors::{Dht20, Monitor},
    Channels, Timing,
};
use embassy_executor::Spawner;
use embassy_net::{Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use esp_backtrace as _;
use esp_hal::{
    clock::{ClockControl, Clocks},
    delay::Delay,
    gpio::{GpioPin, Io, Level, Output},
    i2c::I2C,
    peripherals::{Peripherals, I2C0, I2C1},
    prelude::*,
    rmt::{Channel, Rmt},
    rng::Rng,
    system::SystemControl,
    timer::timg::TimerGroup,
    Blocking,
};
use esp_hal_smartled::{smartLedBuffer, SmartLedsAdapter};
use esp_wifi::{
    wifi::{
        ClientConfiguration, Configuration, WifiController, WifiDevice, WifiEvent, WifiStaDevice,
        WifiState,
    },
    EspWifiInitFor,
};
use static_cell::StaticCell;

const SSID: &str = env!("ESP32_WIFI_SSID");
const PASS: &str = env!("ESP32_WIFI_PASS");
const NET_SEED: u64 = 0x5eed_c0de_2024;
const HEARTBEAT: Duration = Duration::from_secs(30);
const TIMING: Timing = Timing::new();

pub static CHANNELS: Channels<CriticalSectionRawMutex> = Channels::new();

static CLOCKS: StaticCell<Clocks> = StaticCell::new();
static STACK: StaticCell<Stack<WifiDevice<'static, WifiStaDevice>>> = StaticCell::new();
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

type SensorBus = I2C<'static, I2C0, Blocking>;
type DisplayBus = I2C<'static, I2C1, Blocking>;
type StatusLed = Output<'static, GpioPin<2>>;
// one pixel: 24 bits + end marker
type NeoPixel = SmartLedsAdapter<Channel<Blocking, 0>, 25>;

#[main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    log::info!("Climate monitor: DHT20 -> status LED, NeoPixel, LCD");

    let peripherals = Peripherals::take();
    let system = SystemControl::new(peripherals.SYSTEM);
    let clocks = &*CLOCKS.init(ClockControl::max(system.clock_control).freeze());

    let timg0 = TimerGroup::new_async(peripherals.TIMG0, clocks);
    esp_hal::embassy::init(clocks, timg0);

    let io = Io::new(peripherals.GPIO, peripherals.IO_MUX);

    // wifi
    let timer = TimerGroup::new(peripherals.TIMG1, clocks, None).timer0;
    let init = esp_wifi::initialize(
        EspWifiInitFor::Wifi,
        timer,
        Rng::new(peripherals.RNG),
        peripherals.RADIO_CLK,
        clocks,
    )
    .expect("initializing wifi");
    let (wifi_interface, controller) =
        esp_wifi::wifi::new_with_mode(&init, peripherals.WIFI, WifiStaDevice)
            .expect("creating wifi station interface");

    let stack = &*STACK.init(Stack::new(
        wifi_interface,
        embassy_net::Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::new()),
        NET_SEED,
    ));

    // sensor on I2C0, LCD backpack on I2C1
    let sensor_bus = I2C::new(
        peripherals.I2C0,
        io.pins.gpio21,
        io.pins.gpio22,
        100.kHz(),
        clocks,
        None,
    );
    let display_bus = I2C::new(
        peripherals.I2C1,
        io.pins.gpio32,
        io.pins.gpio33,
        100.kHz(),
        clocks,
        None,
    );

    let mut lcd = Lcd1602::new(display_bus, Delay::new(clocks), DEFAULT_ADDRESS);
    if let Err(e) = lcd.init() {
        log::error!("Failed to initialise LCD, continuing without it: {:?}", e);
    }

    let rmt = Rmt::new(peripherals.RMT, 80.MHz(), clocks, None).expect("configuring RMT");
    let neopixel = SmartLedsAdapter::new(rmt.channel0, io.pins.gpio25, smartLedBuffer!(1), clocks);

    let status_led = Output::new(io.pins.gpio2, Level::Low);

    spawner
        .spawn(connection(controller))
        .expect("spawning wifi connection task");
    spawner.spawn(net_task(stack)).expect("spawning network task");
    spawner
        .spawn(monitor(Dht20::new(sensor_bus)))
        .expect("spawning monitor task");
    spawner.spawn(led(status_led)).expect("spawning LED task");
    spawner
        .spawn(pixel(SmartPixel(neopixel)))
        .expect("spawning NeoPixel task");
    spawner.spawn(display(lcd)).expect("spawning LCD task");
    spawner
        .spawn(http::post_updates(stack))
        .expect("spawning status upload task");

    log::info!("All tasks created");

    loop {
        Timer::after(HEARTBEAT).await;
        match CHANNELS
            .display_state
            .read_within(TIMING.state_lock_timeout)
            .await
        {
            Ok(state) => log::info!(
                "display state {}, link up: {}",
                state,
                stack.is_link_up()
            ),
            Err(_) => log::warn!(
                "display state busy, link up: {}",
                stack.is_link_up()
            ),
        }
    }
}

#[embassy_executor::task]
async fn monitor(sensor: Dht20<SensorBus>) {
    Monitor::new(sensor, &CHANNELS, TIMING).run().await
}

#[embassy_executor::task]
async fn led(pin: StatusLed) {
    LedIndicator::new(pin)
        .run(&CHANNELS.temperature, TIMING)
        .await
}

#[embassy_executor::task]
async fn pixel(neopixel: SmartPixel<NeoPixel>) {
    PixelIndicator::new(neopixel)
        .run(&CHANNELS.humidity, TIMING)
        .await
}

#[embassy_executor::task]
async fn display(lcd: Lcd1602<DisplayBus, Delay>) {
    DisplayPanel::new(lcd, &CHANNELS, TIMING).run().await
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    log::info!("Device capabilities: {:?}", controller.get_capabilities());
    loop {
        if esp_wifi::wifi::get_wifi_state() == WifiState::StaConnected {
            // wait until we're no longer connected
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            log::warn!("Wifi disconnected");
            Timer::after(Duration::from_millis(5000)).await;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let (Ok(ssid), Ok(password)) = (SSID.try_into(), PASS.try_into()) else {
                log::error!("Wifi credentials do not fit the driver configuration");
                return;
            };
            let client_config = Configuration::Client(ClientConfiguration {
                ssid,
                password,
                ..Default::default()
            });
            if let Err(e) = controller.set_configuration(&client_config) {
                log::error!("Failed to configure wifi: {:?}", e);
            }
            log::info!("Starting wifi");
            if let Err(e) = controller.start().await {
                log::error!("Failed to start wifi: {:?}", e);
            }
        }

        log::info!("Connecting to {}", SSID);
        match controller.connect().await {
            Ok(()) => log::info!("Wifi connected"),
            Err(e) => {
                log::error!("Failed to connect to wifi: {:?}", e);
                Timer::after(Duration::from_millis(5000)).await;
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(stack: &'static Stack<WifiDevice<'static, WifiStaDevice>>) {
    stack.run().await
}
