// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use ccsecboot::cert::{self, CertHeader, CertType, Certificate, FixedTime};
use ccsecboot::otp::MemoOtpStore;
use ccsecboot::sb::{self, CertChain, ChainType, MemoFlash, MemoRam, VerifiedImageInfo};
use ccsecboot::secdebug::{self, DebugCertPackage, DebugOutcome};
use clap::Parser;
use std::error::Error;
use std::fs;

#[derive(Parser)]
enum CcSecBootCli {
    Verify(VerifyArgs),
    Inspect(InspectArgs),
    CertSize(CertSizeArgs),
    StoreAddr(StoreAddrArgs),
    Debug(DebugArgs),
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Walk the secure boot certificate chain stored in the supplied \
    flash image and verify the software images it describes")]
struct VerifyArgs {
    #[arg(short, long, default_value = "otp.json")]
    otp: String,

    #[arg(short, long, default_value = "flash.bin")]
    flash: String,

    #[arg(long, default_value = "0x0", value_parser = parse_addr)]
    flash_base: u64,

    #[arg(long, default_value = "0x80000000", value_parser = parse_addr)]
    ram_base: u64,

    #[arg(long, default_value = "0x100000", value_parser = parse_addr)]
    ram_size: u64,

    /// Flash address of each certificate, root first
    #[arg(short, long, required = true, value_parser = parse_addr)]
    cert: Vec<u64>,

    /// Check X.509 validity at this time, in seconds since the Unix epoch,
    /// rather than now
    #[arg(long)]
    at: Option<i64>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode the supplied certificate, or secure debug package, and \
    print it as JSON")]
struct InspectArgs {
    #[arg(short, long, default_value = "cert.bin")]
    cert: String,

    /// Decode a secure debug package instead of a single certificate
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Chain {
    Boot,
    Debug,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Print how many bytes must be read to get the certificate whose \
    header is at the start of the supplied file")]
struct CertSizeArgs {
    #[arg(short, long, default_value = "cert.bin")]
    cert: String,

    #[arg(long, value_enum, default_value = "boot")]
    chain: Chain,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Set the flash address an image is loaded from in the supplied \
    content certificate package")]
struct StoreAddrArgs {
    #[arg(short, long, default_value = "cert.bin")]
    cert: String,

    #[arg(short, long)]
    index: usize,

    #[arg(short, long, value_parser = parse_addr)]
    addr: u64,

    /// Where to write the patched package, defaults to updating it in place
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify the supplied secure debug package and print the \
    resulting debug control unit settings")]
struct DebugArgs {
    #[arg(short, long, default_value = "otp.json")]
    otp: String,

    /// Without a package, the OTP default lock applies
    #[arg(short, long)]
    package: Option<String>,
}

fn parse_addr(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u64::from_str_radix(h, 16),
        None => s.parse(),
    }
}

fn main() {
    env_logger::init();

    match CcSecBootCli::parse() {
        CcSecBootCli::Verify(args) => match verify(&args) {
            Ok(images) => {
                for i in &images {
                    println!("{:?} image at {:#x}, {} bytes", i.mem_type, i.addr, i.size);
                }
                println!("verification successful")
            }
            Err(e) => eprintln!("verification failed: {e}"),
        },

        CcSecBootCli::Inspect(args) => match inspect(&args) {
            Ok(j) => println!("{j}"),
            Err(e) => eprintln!("inspection failed: {e}"),
        },

        CcSecBootCli::CertSize(args) => match cert_size(&args) {
            Ok(n) => println!("{n}"),
            Err(e) => eprintln!("size query failed: {e}"),
        },

        CcSecBootCli::StoreAddr(args) => match store_addr(&args) {
            Ok(_) => println!("store address update successful"),
            Err(e) => eprintln!("store address update failed: {e}"),
        },

        CcSecBootCli::Debug(args) => match debug(&args) {
            Ok(o) => {
                println!("dcu: {:08x?} lock: {:08x?} rma: {}", o.dcu, o.lock, o.is_rma);
                println!("secure debug successful")
            }
            Err(e) => eprintln!("secure debug failed: {e}"),
        },
    }
}

fn load_otp(path: &str) -> Result<MemoOtpStore, Box<dyn Error>> {
    let j = fs::read_to_string(path)?;

    let mut otp: MemoOtpStore = Default::default();
    otp.load_json(&j)?;

    Ok(otp)
}

fn verify(args: &VerifyArgs) -> Result<Vec<VerifiedImageInfo>, Box<dyn Error>> {
    let otp = load_otp(&args.otp)?;

    let flash = MemoFlash::from_image(args.flash_base, fs::read(&args.flash)?);
    let ram = MemoRam::new(args.ram_base, usize::try_from(args.ram_size)?);

    let mut chain = match args.at {
        Some(t) => CertChain::with_validity(Box::new(FixedTime(t))),
        None => CertChain::new(),
    };
    let mut images = vec![];

    for addr in &args.cert {
        chain.verify_single(&otp, &flash, &ram, *addr, &mut images)?;
    }

    if !chain.is_complete() {
        return Err("chain does not end with a content certificate".into());
    }

    Ok(images)
}

fn inspect(args: &InspectArgs) -> Result<String, Box<dyn Error>> {
    let c: Vec<u8> = fs::read(&args.cert)?;

    if args.debug {
        let p = DebugCertPackage::parse(&c)?;
        return Ok(serde_json::to_string_pretty(&p)?);
    }

    let t = if cert::is_x509(&c) {
        cert::x509_cert_type(&c)?
    } else {
        let h = CertHeader::decode(&c)?;
        CertType::from_magic(h.magic)
            .ok_or_else(|| format!("unknown magic number {:#010x}", h.magic))?
    };

    let cert = Certificate::decode_package(&c, t)?;

    Ok(serde_json::to_string_pretty(&cert)?)
}

fn cert_size(args: &CertSizeArgs) -> Result<usize, Box<dyn Error>> {
    let c: Vec<u8> = fs::read(&args.cert)?;

    let chain = match args.chain {
        Chain::Boot => ChainType::SecureBoot,
        Chain::Debug => ChainType::SecureDebug,
    };

    Ok(sb::get_cert_size(chain, &c)?)
}

fn store_addr(args: &StoreAddrArgs) -> Result<(), Box<dyn Error>> {
    let mut c: Vec<u8> = fs::read(&args.cert)?;
    let max = c.len();

    sb::sw_image_store_addr_change(&mut c, max, args.addr, args.index)?;

    fs::write(args.output.as_ref().unwrap_or(&args.cert), c)?;

    Ok(())
}

fn debug(args: &DebugArgs) -> Result<DebugOutcome, Box<dyn Error>> {
    let otp = load_otp(&args.otp)?;

    let Some(path) = &args.package else {
        return Ok(secdebug::secure_debug_default(&otp)?);
    };

    let c: Vec<u8> = fs::read(path)?;
    let pkg = DebugCertPackage::parse(&c)?;

    Ok(secdebug::secure_debug_set(&otp, &pkg)?)
}
