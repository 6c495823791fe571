//! Bus commands for the line frontend
//!
//! | Command | Arguments | Action |
//! |---|---|---|
//! | `TXBIND` | pin baud | bind a transmitter, reply with its channel |
//! | `RXBIND` | pin baud | bind a receiver, reply with its channel |
//! | `SEND` | ch word | blocking send |
//! | `SENDNB` | ch word | non-blocking send |
//! | `RANDOM` | ch | send a random odd-parity word |
//! | `TXRATE` / `RXRATE` | ch baud | change baud rate |
//! | `AVAIL` | ch | report whether a word is waiting |
//! | `RECV` | ch | take a waiting word |
//! | `TXFREE` / `RXFREE` | ch | release a channel |
//! | `LIST` | | list commands |
//!
//! Replies start with `#`; bus errors with `!`; argument errors are the
//! `ERRn` codes of [`CommandError::code`].

use crate::bus::Arinc429Bus;
use crate::error::{BusError, CommandError};
use crate::frontend::{Arguments, CommandFrontend, CommandResult, Dispatch};
use crate::hardware::PioHardware;
use crate::receiver::Receiver;
use crate::transmitter::Transmitter;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Context the bus commands run against
pub struct Console<H: PioHardware> {
    bus: Arinc429Bus<H>,
    transmitters: Vec<Option<Transmitter>>,
    receivers: Vec<Option<Receiver>>,
    rng: StdRng,
    commands: Vec<String>,
    output: Vec<String>,
}

impl<H: PioHardware + 'static> Console<H> {
    /// Create a console over `bus`; `seed` drives `RANDOM`
    pub fn new(bus: Arinc429Bus<H>, seed: u64) -> Self {
        Console {
            bus,
            transmitters: Vec::new(),
            receivers: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            commands: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Build a frontend with every bus command registered
    pub fn frontend(&mut self) -> CommandFrontend<Self> {
        let mut frontend = CommandFrontend::new();
        frontend.add_command("TXBIND", Self::tx_bind);
        frontend.add_command("RXBIND", Self::rx_bind);
        frontend.add_command("SEND", Self::send);
        frontend.add_command("SENDNB", Self::send_non_blocking);
        frontend.add_command("RANDOM", Self::send_random);
        frontend.add_command("TXRATE", Self::tx_rate);
        frontend.add_command("RXRATE", Self::rx_rate);
        frontend.add_command("AVAIL", Self::available);
        frontend.add_command("RECV", Self::receive);
        frontend.add_command("TXFREE", Self::tx_free);
        frontend.add_command("RXFREE", Self::rx_free);
        frontend.add_command("LIST", Self::list);
        frontend.set_default_handler(|name: &str, console: &mut Self| {
            console.reply(format!("!unknown command {}", name));
        });
        self.commands = frontend
            .command_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        frontend
    }

    /// Feed input through `frontend`, turning argument errors into replies
    pub fn run(&mut self, frontend: &mut CommandFrontend<Self>, input: &[u8]) {
        for &byte in input {
            if let Some(Dispatch::Failed { error, .. }) = frontend.feed_byte(byte, self) {
                self.reply(error.code());
            }
        }
    }

    /// The bus
    pub fn bus(&self) -> &Arinc429Bus<H> {
        &self.bus
    }

    /// Mutable access to the bus
    pub fn bus_mut(&mut self) -> &mut Arinc429Bus<H> {
        &mut self.bus
    }

    /// Take all replies produced so far
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    fn reply(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn report(&mut self, result: Result<String, BusError>) {
        match result {
            Ok(line) => self.reply(line),
            Err(err) => self.reply(format!("!{}", err)),
        }
    }

    fn pin_and_baud(args: &mut Arguments<'_>) -> Result<(u8, u32), CommandError> {
        let pin = args.next_int()?;
        let pin = u8::try_from(pin).map_err(|_| CommandError::invalid_number(pin.to_string()))?;
        let baud = args.next_ulong()?;
        Ok((pin, baud))
    }

    fn channel(args: &mut Arguments<'_>) -> Result<usize, CommandError> {
        let ch = args.next_int()?;
        usize::try_from(ch).map_err(|_| CommandError::invalid_number(ch.to_string()))
    }

    fn tx_bind(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let (pin, baud) = Self::pin_and_baud(args)?;
        let result = console.bus.bind_transmitter(pin, baud).map(|tx| {
            let line = format!("#TX {} {}", console.transmitters.len(), tx.handle());
            console.transmitters.push(Some(tx));
            line
        });
        console.report(result);
        Ok(())
    }

    fn rx_bind(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let (pin, baud) = Self::pin_and_baud(args)?;
        let result = console.bus.bind_receiver(pin, baud).map(|rx| {
            let line = format!("#RX {} {}", console.receivers.len(), rx.handle());
            console.receivers.push(Some(rx));
            line
        });
        console.report(result);
        Ok(())
    }

    fn send(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let word = args.next_ulong()?;
        match console.transmitters.get(ch).and_then(Option::as_ref) {
            Some(tx) => {
                tx.send_blocking(console.bus.hardware_mut(), word);
                console.reply("#OK");
            }
            None => console.reply(format!("!no transmitter {}", ch)),
        }
        Ok(())
    }

    fn send_non_blocking(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let word = args.next_ulong()?;
        match console.transmitters.get(ch).and_then(Option::as_ref) {
            Some(tx) => {
                if tx.send_non_blocking(console.bus.hardware_mut(), word) {
                    console.reply("#OK");
                } else {
                    console.reply("!FIFO full");
                }
            }
            None => console.reply(format!("!no transmitter {}", ch)),
        }
        Ok(())
    }

    fn send_random(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let Some(tx) = console.transmitters.get(ch).and_then(Option::as_ref) else {
            console.reply(format!("!no transmitter {}", ch));
            return Ok(());
        };
        match console.bus.send_random(tx, &mut console.rng) {
            Some(word) => console.reply(format!("#SENT {}", word)),
            None => console.reply("!FIFO full"),
        }
        Ok(())
    }

    fn tx_rate(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let baud = args.next_ulong()?;
        let result = match console.transmitters.get_mut(ch).and_then(Option::as_mut) {
            Some(tx) => tx
                .set_baud_rate(console.bus.hardware_mut(), baud)
                .map(|()| "#OK".to_string()),
            None => Ok(format!("!no transmitter {}", ch)),
        };
        console.report(result);
        Ok(())
    }

    fn rx_rate(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let baud = args.next_ulong()?;
        let result = match console.receivers.get_mut(ch).and_then(Option::as_mut) {
            Some(rx) => rx
                .set_baud_rate(console.bus.hardware_mut(), baud)
                .map(|()| "#OK".to_string()),
            None => Ok(format!("!no receiver {}", ch)),
        };
        console.report(result);
        Ok(())
    }

    fn available(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        match console.receivers.get(ch).and_then(Option::as_ref) {
            Some(rx) => {
                let available = console.bus.is_available(rx);
                console.reply(format!("#{}", u8::from(available)));
            }
            None => console.reply(format!("!no receiver {}", ch)),
        }
        Ok(())
    }

    fn receive(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        match console.receivers.get(ch).and_then(Option::as_ref) {
            Some(rx) => match rx.try_receive(console.bus.hardware_mut()) {
                Some(word) => console.reply(format!("#0x{:08X}", word)),
                None => console.reply("#NONE"),
            },
            None => console.reply(format!("!no receiver {}", ch)),
        }
        Ok(())
    }

    fn tx_free(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let result = match console.transmitters.get_mut(ch).and_then(Option::take) {
            Some(tx) => console.bus.release(tx.into_handle()).map(|()| "#OK".to_string()),
            None => Ok(format!("!no transmitter {}", ch)),
        };
        console.report(result);
        Ok(())
    }

    fn rx_free(args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let ch = Self::channel(args)?;
        let result = match console.receivers.get_mut(ch).and_then(Option::take) {
            Some(rx) => console.bus.release(rx.into_handle()).map(|()| "#OK".to_string()),
            None => Ok(format!("!no receiver {}", ch)),
        };
        console.report(result);
        Ok(())
    }

    fn list(_args: &mut Arguments<'_>, console: &mut Self) -> CommandResult {
        let line = console.commands.join(" ");
        console.reply(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Arinc429BusBuilder;
    use crate::core::Platform;
    use crate::loader::tests::test_programs;
    use crate::sim::SimulatedPio;

    fn console() -> (Console<SimulatedPio>, CommandFrontend<Console<SimulatedPio>>) {
        let bus = Arinc429BusBuilder::new(test_programs())
            .with_platform(Platform::Rp2040)
            .build(SimulatedPio::default())
            .expect("default platform matches default simulator");
        let mut console = Console::new(bus, 42);
        let frontend = console.frontend();
        (console, frontend)
    }

    #[test]
    fn test_bind_send_receive() {
        let (mut console, mut frontend) = console();
        console.bus_mut().hardware_mut().wire(2, 3);

        console.run(&mut frontend, b"TXBIND 2 100000\nRXBIND 3 100000\n");
        let output = console.take_output();
        assert!(output[0].starts_with("#TX 0 PIO[0] SM[0]"));
        assert!(output[1].starts_with("#RX 0 PIO[0] SM[1]"));

        console.run(&mut frontend, b"SENDNB 0 0x80000000\n");
        console.bus_mut().hardware_mut().drain();
        console.run(&mut frontend, b"AVAIL 0\nRECV 0\nRECV 0\n");
        assert_eq!(
            console.take_output(),
            vec!["#OK", "#1", "#0x80000000", "#NONE"]
        );
    }

    #[test]
    fn test_random_and_blocking_send() {
        let (mut console, mut frontend) = console();
        console.bus_mut().hardware_mut().loopback(4);
        console.run(&mut frontend, b"TXBIND 4 12500\nRXBIND 4 12500\n");
        console.take_output();

        console.run(&mut frontend, b"RANDOM 0\n");
        let sent = console.take_output().remove(0);
        let word = sent.strip_prefix("#SENT ").unwrap().to_string();

        console.run(&mut frontend, b"SEND 0 1\n");
        console.bus_mut().hardware_mut().drain();
        console.run(&mut frontend, b"RECV 0\nRECV 0\n");
        assert_eq!(
            console.take_output(),
            vec!["#OK".to_string(), format!("#{}", word), "#0x00000001".to_string()]
        );
    }

    #[test]
    fn test_errors() {
        let (mut console, mut frontend) = console();
        console.run(
            &mut frontend,
            b"TXBIND 2\nTXBIND x 5\nSEND 0 1\nTXBIND 2 0\nFOO\nRXRATE -1 5\n",
        );
        assert_eq!(
            console.take_output(),
            vec![
                "ERR1".to_string(),
                "ERR2".to_string(),
                "!no transmitter 0".to_string(),
                "!Invalid baud rate: baud rate must be positive".to_string(),
                "!unknown command FOO".to_string(),
                "ERR2".to_string(),
            ]
        );
    }

    #[test]
    fn test_exhaustion_and_release() {
        let (mut console, mut frontend) = console();
        for pin in 0..8u8 {
            console.run(&mut frontend, format!("RXBIND {} 100000\n", pin).as_bytes());
        }
        console.run(&mut frontend, b"TXBIND 9 100000\n");
        let output = console.take_output();
        assert_eq!(
            output.last().map(String::as_str),
            Some("!Resource exhausted: no free lane in any engine")
        );

        console.run(&mut frontend, b"RXFREE 3\nRXFREE 3\nTXBIND 9 100000\n");
        let output = console.take_output();
        assert_eq!(output[0], "#OK");
        assert_eq!(output[1], "!no receiver 3");
        assert!(output[2].starts_with("#TX 0 PIO[0] SM[3]"));
    }

    #[test]
    fn test_rate_and_list() {
        let (mut console, mut frontend) = console();
        console.run(&mut frontend, b"TXBIND 2 100000\nTXRATE 0 12500\nLIST\n");
        let output = console.take_output();
        assert_eq!(output[1], "#OK");
        assert!(output[2].starts_with("TXBIND RXBIND SEND SENDNB RANDOM"));
        assert!(output[2].ends_with("LIST"));
    }
}
