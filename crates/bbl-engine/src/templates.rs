//! Infrastructure templates, one base document per IaaS plus one snippet per
//! LB type. Each template aliases provider-specific resources onto the
//! uniform output names the rest of the pipeline consumes.

use bbl_domain::{Iaas, LbKind};

pub fn render(iaas: Iaas, lb: LbKind) -> String {
    let mut hcl = String::from(HEADER);
    hcl.push_str(match iaas {
        Iaas::Aws => AWS_BASE,
        Iaas::Gcp => GCP_BASE,
        Iaas::Azure => AZURE_BASE,
    });
    match (iaas, lb) {
        (_, LbKind::None) => {}
        (Iaas::Aws, LbKind::Concourse) => hcl.push_str(AWS_CONCOURSE),
        (Iaas::Aws, LbKind::Cf) => hcl.push_str(AWS_CF),
        (Iaas::Gcp, LbKind::Concourse) => hcl.push_str(GCP_CONCOURSE),
        (Iaas::Gcp, LbKind::Cf) => hcl.push_str(GCP_CF),
        (Iaas::Azure, LbKind::Concourse) => hcl.push_str(AZURE_CONCOURSE),
        (Iaas::Azure, LbKind::Cf) => hcl.push_str(AZURE_CF),
    }
    hcl
}

const HEADER: &str = r#"# Generated by bbl — do not edit

variable "env_id" {}
variable "region" {}
variable "lb_cert" {
  default = ""
}
variable "lb_key" {
  default = ""
}
variable "lb_chain" {
  default = ""
}
variable "lb_domain" {
  default = ""
}
"#;

// ── AWS ───────────────────────────────────────────────────────────────────────

const AWS_BASE: &str = r#"
provider "aws" {
  region = var.region
}

resource "aws_vpc" "bbl" {
  cidr_block           = "10.0.0.0/16"
  enable_dns_hostnames = true

  tags = {
    Name = "${var.env_id}-vpc"
  }
}

resource "aws_internet_gateway" "bbl" {
  vpc_id = aws_vpc.bbl.id
}

resource "aws_subnet" "internal" {
  vpc_id            = aws_vpc.bbl.id
  cidr_block        = "10.0.16.0/20"
  availability_zone = "${var.region}a"

  tags = {
    Name = "${var.env_id}-internal"
  }
}

resource "aws_security_group" "internal" {
  name   = "${var.env_id}-internal-security-group"
  vpc_id = aws_vpc.bbl.id

  ingress {
    from_port = 0
    to_port   = 0
    protocol  = "-1"
    self      = true
  }

  egress {
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }

  tags = {
    Name = "${var.env_id}-internal"
  }
}

output "network_name" {
  value = aws_vpc.bbl.id
}

output "subnetwork_name" {
  value = aws_subnet.internal.id
}

output "internal_tag_name" {
  value = aws_security_group.internal.name
}
"#;

const AWS_CONCOURSE: &str = r#"
resource "aws_elb" "concourse" {
  name    = "${var.env_id}-concourse-lb"
  subnets = [aws_subnet.internal.id]

  listener {
    instance_port      = 443
    instance_protocol  = "tcp"
    lb_port            = 443
    lb_protocol        = "ssl"
    ssl_certificate_id = aws_iam_server_certificate.lb.arn
  }
}

resource "aws_iam_server_certificate" "lb" {
  name_prefix       = "${var.env_id}-"
  certificate_body  = var.lb_cert
  certificate_chain = var.lb_chain != "" ? var.lb_chain : null
  private_key       = var.lb_key

  lifecycle {
    create_before_destroy = true
  }
}

output "concourse_target_pool" {
  value = aws_elb.concourse.name
}
"#;

const AWS_CF: &str = r#"
resource "aws_iam_server_certificate" "lb" {
  name_prefix       = "${var.env_id}-"
  certificate_body  = var.lb_cert
  certificate_chain = var.lb_chain != "" ? var.lb_chain : null
  private_key       = var.lb_key

  lifecycle {
    create_before_destroy = true
  }
}

resource "aws_elb" "cf_router" {
  name    = "${var.env_id}-cf-router-lb"
  subnets = [aws_subnet.internal.id]

  listener {
    instance_port      = 443
    instance_protocol  = "tcp"
    lb_port            = 443
    lb_protocol        = "ssl"
    ssl_certificate_id = aws_iam_server_certificate.lb.arn
  }
}

resource "aws_elb" "cf_ssh" {
  name    = "${var.env_id}-cf-ssh-lb"
  subnets = [aws_subnet.internal.id]

  listener {
    instance_port     = 2222
    instance_protocol = "tcp"
    lb_port           = 2222
    lb_protocol       = "tcp"
  }
}

resource "aws_elb" "cf_tcp" {
  name    = "${var.env_id}-cf-tcp-lb"
  subnets = [aws_subnet.internal.id]

  listener {
    instance_port     = 1024
    instance_protocol = "tcp"
    lb_port           = 1024
    lb_protocol       = "tcp"
  }
}

resource "aws_elb" "credhub" {
  name    = "${var.env_id}-credhub-lb"
  subnets = [aws_subnet.internal.id]

  listener {
    instance_port     = 8844
    instance_protocol = "tcp"
    lb_port           = 8844
    lb_protocol       = "tcp"
  }
}

output "router_backend_service" {
  value = aws_elb.cf_router.name
}

output "ws_target_pool" {
  value = aws_elb.cf_router.name
}

output "ssh_proxy_target_pool" {
  value = aws_elb.cf_ssh.name
}

output "tcp_router_target_pool" {
  value = aws_elb.cf_tcp.name
}

output "credhub_target_pool" {
  value = aws_elb.credhub.name
}
"#;

// ── GCP ───────────────────────────────────────────────────────────────────────

const GCP_BASE: &str = r#"
provider "google" {
  region = var.region
}

resource "google_compute_network" "bbl" {
  name                    = "${var.env_id}-network"
  auto_create_subnetworks = false
}

resource "google_compute_subnetwork" "bbl" {
  name          = "${var.env_id}-subnet"
  ip_cidr_range = "10.0.0.0/16"
  network       = google_compute_network.bbl.self_link
}

resource "google_compute_firewall" "internal" {
  name    = "${var.env_id}-internal"
  network = google_compute_network.bbl.name

  allow {
    protocol = "tcp"
  }

  allow {
    protocol = "udp"
  }

  allow {
    protocol = "icmp"
  }

  source_tags = ["${var.env_id}-internal"]
  target_tags = ["${var.env_id}-internal"]
}

output "network_name" {
  value = google_compute_network.bbl.name
}

output "subnetwork_name" {
  value = google_compute_subnetwork.bbl.name
}

output "internal_tag_name" {
  value = "${var.env_id}-internal"
}
"#;

const GCP_CONCOURSE: &str = r#"
resource "google_compute_address" "concourse" {
  name = "${var.env_id}-concourse"
}

resource "google_compute_target_pool" "concourse" {
  name   = "${var.env_id}-concourse"
  region = var.region
}

resource "google_compute_forwarding_rule" "concourse" {
  name       = "${var.env_id}-concourse"
  target     = google_compute_target_pool.concourse.self_link
  port_range = "443"
  ip_address = google_compute_address.concourse.address
}

output "concourse_target_pool" {
  value = google_compute_target_pool.concourse.name
}
"#;

const GCP_CF: &str = r#"
resource "google_compute_backend_service" "router" {
  name        = "${var.env_id}-router-lb"
  port_name   = "https"
  protocol    = "HTTPS"
  timeout_sec = 900

  backend {
    group = google_compute_instance_group.router.self_link
  }

  health_checks = [google_compute_health_check.cf_public_health_check.self_link]
}

resource "google_compute_instance_group" "router" {
  name = "${var.env_id}-router-lb"
  zone = "${var.region}-a"
}

resource "google_compute_health_check" "cf_public_health_check" {
  name = "${var.env_id}-cf"

  tcp_health_check {
    port = 8080
  }
}

resource "google_compute_target_pool" "cf_ws" {
  name   = "${var.env_id}-cf-ws"
  region = var.region
}

resource "google_compute_target_pool" "cf_ssh_proxy" {
  name   = "${var.env_id}-cf-ssh-proxy"
  region = var.region
}

resource "google_compute_target_pool" "cf_tcp_router" {
  name   = "${var.env_id}-cf-tcp-router"
  region = var.region
}

resource "google_compute_target_pool" "credhub" {
  name   = "${var.env_id}-credhub"
  region = var.region
}

output "router_backend_service" {
  value = google_compute_backend_service.router.name
}

output "ws_target_pool" {
  value = google_compute_target_pool.cf_ws.name
}

output "ssh_proxy_target_pool" {
  value = google_compute_target_pool.cf_ssh_proxy.name
}

output "tcp_router_target_pool" {
  value = google_compute_target_pool.cf_tcp_router.name
}

output "credhub_target_pool" {
  value = google_compute_target_pool.credhub.name
}
"#;

// ── Azure ─────────────────────────────────────────────────────────────────────

const AZURE_BASE: &str = r#"
provider "azurerm" {
  features {}
}

resource "azurerm_resource_group" "bbl" {
  name     = "${var.env_id}-bosh"
  location = var.region
}

resource "azurerm_virtual_network" "bbl" {
  name                = "${var.env_id}-network"
  address_space       = ["10.0.0.0/16"]
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
}

resource "azurerm_subnet" "bbl" {
  name                 = "${var.env_id}-subnet"
  resource_group_name  = azurerm_resource_group.bbl.name
  virtual_network_name = azurerm_virtual_network.bbl.name
  address_prefixes     = ["10.0.16.0/20"]
}

resource "azurerm_network_security_group" "internal" {
  name                = "${var.env_id}-internal"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
}

output "network_name" {
  value = azurerm_virtual_network.bbl.name
}

output "subnetwork_name" {
  value = azurerm_subnet.bbl.name
}

output "internal_tag_name" {
  value = azurerm_network_security_group.internal.name
}
"#;

const AZURE_CONCOURSE: &str = r#"
resource "azurerm_public_ip" "concourse" {
  name                = "${var.env_id}-concourse-ip"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
  allocation_method   = "Static"
}

resource "azurerm_lb" "concourse" {
  name                = "${var.env_id}-concourse-lb"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name

  frontend_ip_configuration {
    name                 = "concourse"
    public_ip_address_id = azurerm_public_ip.concourse.id
  }
}

output "concourse_target_pool" {
  value = azurerm_lb.concourse.name
}
"#;

const AZURE_CF: &str = r#"
resource "azurerm_public_ip" "cf" {
  name                = "${var.env_id}-cf-ip"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
  allocation_method   = "Static"
}

resource "azurerm_lb" "cf_router" {
  name                = "${var.env_id}-cf-router-lb"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name

  frontend_ip_configuration {
    name                 = "cf"
    public_ip_address_id = azurerm_public_ip.cf.id
  }
}

resource "azurerm_lb" "cf_ssh" {
  name                = "${var.env_id}-cf-ssh-lb"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
}

resource "azurerm_lb" "cf_tcp" {
  name                = "${var.env_id}-cf-tcp-lb"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
}

resource "azurerm_lb" "credhub" {
  name                = "${var.env_id}-credhub-lb"
  location            = azurerm_resource_group.bbl.location
  resource_group_name = azurerm_resource_group.bbl.name
}

output "router_backend_service" {
  value = azurerm_lb.cf_router.name
}

output "ws_target_pool" {
  value = azurerm_lb.cf_router.name
}

output "ssh_proxy_target_pool" {
  value = azurerm_lb.cf_ssh.name
}

output "tcp_router_target_pool" {
  value = azurerm_lb.cf_tcp.name
}

output "credhub_target_pool" {
  value = azurerm_lb.credhub.name
}
"#;
