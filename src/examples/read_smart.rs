// examples/read_smart.rs

use smart_passthrough::{Device, NvmeDevice, PlatformNvmeDevice, SmartError};

fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: read_smart <nvme device path>");
        eprintln!("  e.g. /dev/nvme0 or \\\\.\\PhysicalDrive0");
        std::process::exit(2);
    };

    println!("--- smart-passthrough: NVMe SMART report ---");
    println!("NOTE: This requires administrator or root privileges to run!\n");

    let mut device = PlatformNvmeDevice::new(&path);
    if let Err(e) = report(&mut device) {
        eprintln!("[ERROR] {}: {}", path, e);
        if let Some(code) = e.os_code() {
            eprintln!("  OS error code {code}. Check permissions and the device path.");
        }
        std::process::exit(1);
    }
}

fn report(device: &mut PlatformNvmeDevice) -> Result<(), SmartError> {
    device.open()?;
    let (identify, _) = device.identify()?;
    let health = device.health()?;
    let table = device.smart_table()?;
    device.close();

    println!("----------------------------------------");
    println!("  Device Path:  {}", device.path().display());
    println!("  Model:        {}", smart_passthrough::trim_text(&identify.model_number));
    println!("  Serial:       {}", smart_passthrough::trim_text(&identify.serial_number));
    println!("  Firmware:     {}", smart_passthrough::trim_text(&identify.firmware_revision));
    println!("  Vendor ID:    {:#06x}", identify.vendor_id.get());
    println!("----------------------------------------");
    println!("  SMART Health Info:");
    println!("    - {:<22}: {}", "Temperature (Celsius)", health.temperature_celsius);
    println!("    - {:<22}: {}", "Power On Hours", health.power_on_hours);
    println!("    - {:<22}: {}", "Power Cycles", health.power_cycles);
    println!("    - {:<22}: {}", "Unsafe Shutdowns", health.unsafe_shutdowns);
    println!("    - {:<22}: {}", "Media Errors", health.media_errors);
    println!("    - {:<22}: {}%", "Percentage Used", health.percentage_used);
    println!("    - {:<22}: {}", "Critical Warning", health.critical_warning.any());
    println!("----------------------------------------");
    println!("  Full SMART log:");
    for (name, value) in &table {
        println!("    {:<42} {}", name, value);
    }
    Ok(())
}
